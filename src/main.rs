use anyhow::Result;
use rice_inspector::config::AppConfig;
use rice_inspector::errors::error_logging;
use rice_inspector::observability;
use rice_inspector::storage::start_retention_sweeper;
use rice_inspector::web::{self, AppState};
use std::time::{Duration, Instant};
use tracing::info;

/// Load and validate configuration at startup
fn load_configuration() -> Result<AppConfig> {
    let config = AppConfig::from_env().inspect_err(|e| {
        error_logging::log_config_error(e, "environment", "load_configuration");
    })?;

    config.validate().map_err(|e| {
        anyhow::anyhow!(
            "Configuration validation failed: {}. Please check your environment variables.",
            e
        )
    })?;

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let startup = Instant::now();

    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let config = load_configuration()?;
    let state = AppState::new(config);

    // Logging, metrics server and trace export
    let guard =
        observability::init_observability_with_config(&state.config.observability, &state.store)
            .await?;

    info!("{}", state.config.summary());

    state.store.ensure_root()?;
    info!(media_root = %state.store.root().display(), "Media root ready");

    let sweeper = start_retention_sweeper(
        state.store.clone(),
        state.config.media.retention,
        Duration::from_secs(state.config.media.sweep_interval_secs),
    );

    let (addr, server) = web::start_web_server(state).await?;
    observability::metrics::record_startup_metrics(startup.elapsed());
    info!(address = %addr, "Rice inspector ready to accept uploads");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    server.abort();
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    guard.shutdown();

    Ok(())
}
