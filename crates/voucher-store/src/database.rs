//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`].  [`Database::open_at`]
//! and [`Database::open_with`] run migrations before handing the connection
//! out; [`Database::connect`] skips them and is meant for per-request
//! connections against a file that has already been migrated.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use rusqlite::{Connection, TransactionBehavior};

use crate::error::{Result, StoreError};
use crate::migrations;
use crate::transaction::WriteTx;

/// Connection tuning shared by every handle opened on the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// How long a writer waits for the database lock before giving up with
    /// [`StoreError::Contention`].
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Platform default location of the database file.  Creates the parent
    /// directory if it does not exist yet.
    pub fn default_path() -> Result<PathBuf> {
        let project_dirs =
            ProjectDirs::from("com", "voucher", "voucher").ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Ok(data_dir.join("voucher.db"))
    }

    /// Open (or create) a database at an explicit path with default options.
    pub fn open_at(path: &Path) -> Result<Self> {
        Self::open_with(path, &StoreOptions::default())
    }

    /// Open (or create) a database, switch it to WAL and run migrations.
    pub fn open_with(path: &Path, options: &StoreOptions) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut db = Self::connect(path, options)?;

        let mode: String =
            db.conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "database journal mode");

        migrations::run_migrations(&mut db.conn)?;

        Ok(db)
    }

    /// Open a connection without touching the schema.
    pub fn connect(path: &Path, options: &StoreOptions) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(options.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Start a write transaction.
    ///
    /// Issued as `BEGIN IMMEDIATE`: the write lock is taken here rather than
    /// at the first write, so rows read through the returned guard cannot
    /// change underneath it.  Waits up to the busy timeout for other writers.
    pub fn begin_write(&mut self) -> Result<WriteTx<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(WriteTx::new(tx))
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Migrated database in a fresh temp dir.  Keep the `TempDir` alive for
    /// as long as the database is used.
    pub(crate) fn temp_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn open_round_trip() {
        let (_dir, db) = temp_db();
        assert!(db.path().is_some());
        let version: u32 = db
            .conn()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, migrations::CURRENT_VERSION);
    }

    #[test]
    fn reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        drop(Database::open_at(&path).unwrap());
        let db = Database::open_at(&path).unwrap();
        let badges: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM badges", [], |row| row.get(0))
            .unwrap();
        assert_eq!(badges, 6);
    }

    #[test]
    fn explicit_rollback_discards_writes() {
        let (_dir, mut db) = temp_db();
        let tx = db.begin_write().unwrap();
        tx.conn()
            .execute("INSERT INTO badges (id, kind, description) VALUES ('x', 'X', '')", [])
            .unwrap();
        tx.rollback().unwrap();

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM badges WHERE id = 'x'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn newer_schema_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let db = Database::open_at(&path).unwrap();
        db.conn()
            .pragma_update(None, "user_version", migrations::CURRENT_VERSION + 1)
            .unwrap();
        drop(db);

        let err = Database::open_at(&path).err().unwrap();
        assert!(matches!(err, StoreError::Migration(_)), "got {err:?}");
    }

    #[test]
    fn second_writer_times_out_as_contention() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut first = Database::open_at(&path).unwrap();
        let options = StoreOptions {
            busy_timeout: Duration::from_millis(50),
        };
        let mut second = Database::connect(&path, &options).unwrap();

        let _held = first.begin_write().unwrap();
        let err = second.begin_write().err().unwrap();
        assert!(matches!(err, StoreError::Contention), "got {err:?}");
        assert!(err.is_retryable());
    }
}
