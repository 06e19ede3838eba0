use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error not covered by a more specific variant.
    #[error("Database error: {0}")]
    Sqlite(rusqlite::Error),

    /// Another writer held the lock past the busy timeout.  Safe to retry.
    #[error("Database is busy: lock not acquired within timeout")]
    Contention,

    /// A UNIQUE / CHECK / FOREIGN KEY constraint rejected the write.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A stored value could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// `true` when a UNIQUE constraint on `table.column` was violated.
    pub fn is_unique_violation(&self, column: &str) -> bool {
        match self {
            StoreError::Constraint(msg) => msg.contains("UNIQUE") && msg.contains(column),
            _ => false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Contention)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, msg) => match failure.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StoreError::Contention,
                ErrorCode::ConstraintViolation => {
                    StoreError::Constraint(msg.clone().unwrap_or_else(|| err.to_string()))
                }
                _ => StoreError::Sqlite(err),
            },
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            rusqlite::Error::FromSqlConversionFailure(..) => StoreError::Corrupt(err.to_string()),
            _ => StoreError::Sqlite(err),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
