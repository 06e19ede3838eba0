use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use voucher_server::api::{self, AppState};
use voucher_server::clock::SystemClock;
use voucher_server::config::ServerConfig;
use voucher_server::engine::Engine;
use voucher_server::notify::NotificationDispatcher;
use voucher_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,voucher_server=debug")),
        )
        .init();

    info!("Starting voucher server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Open the database and run migrations
    // -----------------------------------------------------------------------
    let store_options = config.store_options();
    let db = Database::open_with(&config.database_path, &store_options)?;
    info!(path = %config.database_path.display(), "Database ready");
    drop(db);

    // -----------------------------------------------------------------------
    // 4. Build the engines
    // -----------------------------------------------------------------------
    let engine = Engine::new(
        &config,
        Arc::new(SystemClock),
        NotificationDispatcher::default(),
    );
    let app_state = AppState::new(engine, config.database_path.clone(), store_options);

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
