//! AirSight AQI server
//!
//! Loads the model archive at startup and serves AQI predictions to the
//! dashboard until interrupted.

use aqi_core::{AqiSystem, StructuredLogger};
use aqi_server::{api, config::ServerConfig};
use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filtered by RUST_LOG
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = ServerConfig::load()?;
    let logger = StructuredLogger::new("aqi-server");

    let mut system = AqiSystem::new();
    system.load_models(&config.model_path);
    let registry = system.registry();
    logger.log_registry_loaded(
        registry.layout().as_str(),
        registry.len(),
        registry.default_model(),
        registry.uses_trained_models(),
    );

    let state = Arc::new(api::AppState::new(system));
    let listen = config.listen_address();
    logger.log_startup(SERVER_VERSION, &config.model_path, &listen);

    let api_handle = tokio::spawn(api::serve(listen, state));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    api_handle.abort();
    info!("Shutting down");

    Ok(())
}
