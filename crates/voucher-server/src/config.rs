//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use voucher_shared::constants::{
    CLOCK_DRIFT_ALLOWANCE_SECS, DEV_HMAC_SECRET, MAX_REDEMPTIONS_PER_SELLER,
    RATE_LIMIT_WINDOW_SECS, SELLER_NONCE_TTL_SECS,
};
use voucher_store::{Database, StoreOptions};

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `voucher.db` in the platform data directory.
    pub database_path: PathBuf,

    /// Key for seller nonce signatures.  Loaded once at start-up.
    /// Env: `SELLER_QR_HMAC_SECRET`
    pub hmac_secret: String,

    /// How long a writer waits for the database lock.
    /// Env: `LOCK_TIMEOUT_MS`
    /// Default: `5000`
    pub lock_timeout: Duration,

    /// Lifetime of a freshly issued seller nonce.
    /// Env: `NONCE_TTL_SECS`
    /// Default: `600`
    pub nonce_ttl_secs: i64,

    /// Grace period past a nonce's expiry.
    /// Env: `CLOCK_DRIFT_SECS`
    /// Default: `30`
    pub clock_drift_secs: i64,

    /// Completed redemptions a seller may take inside one window.
    /// Env: `RATE_LIMIT_MAX_REDEMPTIONS`
    /// Default: `120`
    pub rate_limit_max: u32,

    /// Env: `RATE_LIMIT_WINDOW_SECS`
    /// Default: `60`
    pub rate_limit_window_secs: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: PathBuf::from("voucher.db"),
            hmac_secret: DEV_HMAC_SECRET.to_string(),
            lock_timeout: Duration::from_millis(5000),
            nonce_ttl_secs: SELLER_NONCE_TTL_SECS,
            clock_drift_secs: CLOCK_DRIFT_ALLOWANCE_SECS,
            rate_limit_max: MAX_REDEMPTIONS_PER_SELLER,
            rate_limit_window_secs: RATE_LIMIT_WINDOW_SECS,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("hmac_secret", &"<redacted>")
            .field("lock_timeout", &self.lock_timeout)
            .field("nonce_ttl_secs", &self.nonce_ttl_secs)
            .field("clock_drift_secs", &self.clock_drift_secs)
            .field("rate_limit_max", &self.rate_limit_max)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(addr) = parse_var::<SocketAddr>("HTTP_ADDR") {
            config.http_addr = addr;
        }

        match std::env::var("DATABASE_PATH") {
            Ok(path) if !path.trim().is_empty() => config.database_path = PathBuf::from(path),
            _ => match Database::default_path() {
                Ok(path) => config.database_path = path,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "No platform data directory, using ./voucher.db"
                    );
                }
            },
        }

        match std::env::var("SELLER_QR_HMAC_SECRET") {
            Ok(secret) if !secret.is_empty() => config.hmac_secret = secret,
            _ => tracing::warn!("SELLER_QR_HMAC_SECRET not set, using the development secret"),
        }

        if let Some(ms) = parse_var::<u64>("LOCK_TIMEOUT_MS") {
            config.lock_timeout = Duration::from_millis(ms);
        }

        if let Some(secs) = parse_positive("NONCE_TTL_SECS") {
            config.nonce_ttl_secs = secs;
        }

        if let Some(secs) = parse_var::<i64>("CLOCK_DRIFT_SECS") {
            if secs >= 0 {
                config.clock_drift_secs = secs;
            } else {
                tracing::warn!(value = secs, "Negative CLOCK_DRIFT_SECS, using default");
            }
        }

        if let Some(max) = parse_var::<u32>("RATE_LIMIT_MAX_REDEMPTIONS") {
            config.rate_limit_max = max;
        }

        if let Some(secs) = parse_positive("RATE_LIMIT_WINDOW_SECS") {
            config.rate_limit_window_secs = secs;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: self.lock_timeout,
        }
    }
}

/// Parse an env var, warning (and returning `None`) on a malformed value.
fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Invalid value, using default");
            None
        }
    }
}

fn parse_positive(name: &str) -> Option<i64> {
    let value = parse_var::<i64>(name)?;
    if value > 0 {
        Some(value)
    } else {
        tracing::warn!(var = name, value, "Value must be positive, using default");
        None
    }
}
