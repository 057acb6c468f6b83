//! Hoard Server Binary
//!
//! Runs the Hoard HTTP server. Configuration comes from `HOARD_*`
//! environment variables; see [`hoard_server::ServerConfig`].

use std::env;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use hoard_server::{Hoard, ServerConfig, ServerError};

#[tokio::main]
async fn main() {
    // Initialize logging
    let log_level = env::var("HOARD_LOG_LEVEL")
        .unwrap_or_else(|_| "info".into())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!(error = %e, "Hoard server failed");
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let hoard = start(&config).await?;
    let app = hoard.router();

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, public_url = %config.public_url, "Hoard listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    hoard.shutdown().await
}

#[cfg(feature = "postgres")]
async fn start(config: &ServerConfig) -> Result<Hoard, ServerError> {
    use hoard_server::storage::PostgresStore;

    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::new(url)
                .await
                .map_err(hoard_server::ConfigurationError::from)?;
            Hoard::start(config, Arc::new(store)).await
        }
        None => start_in_memory(config).await,
    }
}

#[cfg(not(feature = "postgres"))]
async fn start(config: &ServerConfig) -> Result<Hoard, ServerError> {
    if config.database_url.is_some() {
        tracing::warn!("HOARD_DATABASE_URL is set but the postgres feature is disabled");
    }
    start_in_memory(config).await
}

async fn start_in_memory(config: &ServerConfig) -> Result<Hoard, ServerError> {
    tracing::warn!("Using in-memory storage: tokens, users and the instance key record are lost on restart");
    Hoard::start(config, Arc::new(hoard_server::MemoryStore::new())).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
