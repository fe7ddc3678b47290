// src/main.rs

use quiz_stats::config::Config;
use quiz_stats::routes;
use quiz_stats::state::AppState;
use quiz_stats::store::GcsStore;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    tracing::info!("Start the app");

    // Missing bucket settings are fatal at startup
    let storage = config
        .storage
        .require()
        .unwrap_or_else(|e| panic!("Invalid storage configuration: {}", e));
    let store = GcsStore::new(&storage, Duration::from_secs(config.http_timeout_secs))
        .unwrap_or_else(|e| panic!("Failed to create storage client: {}", e));

    let state = AppState::new(config.clone(), Arc::new(store))
        .unwrap_or_else(|e| panic!("Failed to build application state: {}", e));

    // Fetch new file if any; a stale local copy is still usable
    tracing::info!("Fetch new file if any");
    match state.sync_and_invalidate().await {
        Ok(changed) => tracing::info!("Initial sync done (changed: {})", changed),
        Err(e) => tracing::error!("Initial sync failed: {}", e),
    }

    // Create the Axum application router
    let app = routes::create_router(state);

    // Bind to the listening address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind {}: {}", addr, e));

    // Start the server
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
