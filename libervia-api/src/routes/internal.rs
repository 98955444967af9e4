//! Internal observability surface (`/internal`).
//!
//! Prometheus text and JSON exports, per-tenant filtered variants, and the
//! operational health assessment. Everything here is global_admin except
//! the per-tenant metrics, which also accept that tenant's tenant_admin.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use libervia_core::{OperationalStatus, TenantId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::telemetry::operational;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

fn refresh_gauges(state: &AppState) {
    state.metrics.update_runtime_metrics();
    state
        .metrics
        .set_active_instances(state.runtime.instance_count());
}

/// GET /internal/metrics - Prometheus text exposition.
pub async fn prometheus_metrics(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    refresh_gauges(&state);
    state.metrics.set_tenants_total(state.registry.count().await);
    let body = state.metrics.prometheus_output()?;
    Ok((
        StatusCode::OK,
        [("content-type", PROMETHEUS_CONTENT_TYPE)],
        body,
    ))
}

/// GET /internal/metrics/json
pub async fn metrics_json(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    refresh_gauges(&state);
    state.metrics.set_tenants_total(state.registry.count().await);
    Ok(Json(state.metrics.snapshot()?))
}

/// GET /internal/tenants/:id/metrics - tenant-filtered exposition.
pub async fn tenant_prometheus_metrics(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<impl IntoResponse> {
    if !state.registry.exists(&id).await {
        return Err(ApiError::tenant_not_found(&id));
    }
    let body = state.metrics.prometheus_output_for_tenant(&id)?;
    Ok((
        StatusCode::OK,
        [("content-type", PROMETHEUS_CONTENT_TYPE)],
        body,
    ))
}

/// GET /internal/tenants/:id/metrics/json
pub async fn tenant_metrics_json(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.registry.exists(&id).await {
        return Err(ApiError::tenant_not_found(&id));
    }
    Ok(Json(state.metrics.snapshot_for_tenant(&id)?))
}

fn status_code_for(status: OperationalStatus) -> StatusCode {
    match status {
        // DEGRADED still serves traffic; only CRITICAL flips the probe
        OperationalStatus::Ok | OperationalStatus::Degraded => StatusCode::OK,
        OperationalStatus::Critical => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// GET /internal/health/operational - full assessment.
pub async fn operational_health(
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    state.metrics.update_runtime_metrics();
    let assessment = operational::assess(&state.metrics)?;
    Ok((status_code_for(assessment.status), Json(assessment)))
}

/// GET /internal/health/operational/status - verdict only.
pub async fn operational_status(
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let assessment = operational::assess(&state.metrics)?;
    Ok((
        status_code_for(assessment.status),
        Json(serde_json::json!({ "status": assessment.status })),
    ))
}

/// Create the `/internal` router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .route("/metrics/json", get(metrics_json))
        .route("/tenants/:id/metrics", get(tenant_prometheus_metrics))
        .route("/tenants/:id/metrics/json", get(tenant_metrics_json))
        .route("/health/operational", get(operational_health))
        .route("/health/operational/status", get(operational_status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(status_code_for(OperationalStatus::Ok), StatusCode::OK);
        assert_eq!(status_code_for(OperationalStatus::Degraded), StatusCode::OK);
        assert_eq!(
            status_code_for(OperationalStatus::Critical),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
