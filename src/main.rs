//! AI gateway external processor
//!
//! Loads the backend configuration and serves the admin endpoints only.
//! Exchanges are fed to `Processor` (see `Processor::open_exchange`) by the
//! ext_proc transport that embeds this crate; that transport is not part of
//! this binary.

use aigateway_extproc::config::{AppConfig, Settings};
use aigateway_extproc::{create_router, version_info};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new().context("Failed to load settings")?;
    init_logging(&settings)?;
    info!("{}", version_info());

    let app_config = match &settings.config_path {
        Some(path) => AppConfig::load(path),
        None => AppConfig::load_default(),
    }
    .context("Failed to load backend configuration")?;
    info!(
        backends = ?app_config.backend_names(),
        input_version = %app_config.input_version(),
        "Backend configuration loaded"
    );

    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let app = create_router(Arc::new(app_config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Admin server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start server: {}", e))?;

    Ok(())
}

/// Initialize logging system
fn init_logging(settings: &Settings) -> Result<()> {
    let log_level = settings.logging.level.clone();

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if settings.is_json_logging() {
        // JSON format logs (production environment)
        Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(log_level)
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .finish(),
        )
    } else {
        // Human readable format (development environment)
        Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(log_level)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .finish(),
        )
    };

    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    info!("Logging system initialized");
    Ok(())
}
