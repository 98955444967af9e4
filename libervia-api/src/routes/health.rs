//! Health Check Endpoints
//!
//! - `/health` - liveness
//! - `/health/ready` - base-dir writability and registry reachability
//!
//! No authentication required.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /health - process liveness.
pub async fn liveness(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: HealthStatus::Ok,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.metrics.uptime_seconds(),
        error: None,
    })
}

/// GET /health/ready - can we actually serve tenants?
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let base_dir = state.registry.base_dir();
    let check = std::fs::create_dir_all(base_dir)
        .map_err(|e| format!("base dir not writable: {}", e))
        .and_then(|_| {
            let probe = base_dir.join(".ready-probe");
            std::fs::write(&probe, b"ok")
                .and_then(|_| std::fs::remove_file(&probe))
                .map_err(|e| format!("base dir probe failed: {}", e))
        });

    match check {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: HealthStatus::Ok,
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_seconds: state.metrics.uptime_seconds(),
                error: None,
            }),
        ),
        Err(error) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: HealthStatus::Unhealthy,
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_seconds: state.metrics.uptime_seconds(),
                error: Some(error),
            }),
        ),
    }
}

/// Create the health router (no auth).
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(liveness))
        .route("/ready", get(readiness))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() -> Result<(), serde_json::Error> {
        let response = HealthResponse {
            status: HealthStatus::Ok,
            version: "0.3.0".to_string(),
            uptime_seconds: 42,
            error: None,
        };
        let json = serde_json::to_string(&response)?;
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"uptimeSeconds\":42"));
        assert!(!json.contains("error"));
        Ok(())
    }
}
