//! HTTP handlers module
//!
//! Admin endpoints served next to the external processor

pub mod health;

use crate::config::AppConfig;
use crate::services::Processor;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Application state
#[derive(Debug, Clone)]
pub struct AppState {
    pub processor: Processor,
}

/// Create the admin router
pub fn create_router(config: Arc<AppConfig>) -> Router {
    let app_state = Arc::new(AppState {
        processor: Processor::new(config),
    });

    let middleware_stack = ServiceBuilder::new().layer(TraceLayer::new_for_http());

    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness_check))
        .route("/health/ready", get(health::readiness_check))
        .with_state(app_state)
        .layer(middleware_stack)
}
