//! Health check handlers
//!
//! Admin endpoints reporting process and configuration status

use crate::handlers::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Name reported by the health endpoints
pub const SERVICE_NAME: &str = "aigateway-extproc";

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service name
    pub service: String,
    /// Version information
    pub version: String,
    /// Timestamp
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

/// Check result
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthDetails {
    /// Schema served to clients, e.g. "OpenAI/v1"
    pub input_schema: String,
    /// Configured backend names
    pub backends: Vec<String>,
    /// Uptime in seconds
    pub uptime_seconds: u64,
}

fn details(state: &AppState) -> HealthDetails {
    let config = state.processor.config();
    HealthDetails {
        input_schema: format!("{}/{}", config.schema.name, config.input_version()),
        backends: config.backend_names().into_iter().map(str::to_string).collect(),
        uptime_seconds: get_uptime_seconds(),
    }
}

fn response(status: &str, details: Option<HealthDetails>) -> HealthResponse {
    HealthResponse {
        status: status.to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        details,
    }
}

/// Basic health check
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    debug!("Executing health check");
    Json(response("healthy", Some(details(&state))))
}

/// Readiness check
///
/// GET /health/ready
/// Ready once at least one backend can be translated to
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, StatusCode> {
    debug!("Executing readiness check");

    let details = details(&state);
    if details.backends.is_empty() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(response("ready", Some(details))))
}

/// Liveness check
///
/// GET /health/live
pub async fn liveness_check() -> Json<HealthResponse> {
    debug!("Executing liveness check");
    Json(response("alive", None))
}

/// Get service uptime in seconds
fn get_uptime_seconds() -> u64 {
    use std::sync::OnceLock;
    use std::time::{SystemTime, UNIX_EPOCH};

    static START_TIME: OnceLock<u64> = OnceLock::new();

    let now = || {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    };
    let start_time = *START_TIME.get_or_init(now);
    now().saturating_sub(start_time)
}
