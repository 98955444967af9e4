//! Operational query surface (`/admin/query`).
//!
//! Read-only aggregations for operators and tenant admins. The four
//! reserved sub-routes (`tenants`, `instances`, `metrics`, `eventlog`) are
//! global; everything else under `/admin/query/:id` is tenant-scoped.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use libervia_core::TenantId;
use serde_json::json;

use crate::error::ApiResult;
use crate::routes::admin::TenantView;
use crate::state::AppState;

/// GET /admin/query/tenants
pub async fn query_tenants(State(state): State<AppState>) -> Json<serde_json::Value> {
    let tenants: Vec<TenantView> = state
        .registry
        .list(true)
        .await
        .iter()
        .map(TenantView::from)
        .collect();
    Json(json!({ "tenants": tenants }))
}

/// GET /admin/query/instances
pub async fn query_instances(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "count": state.runtime.instance_count(),
        "instances": state.runtime.all_metrics(),
    }))
}

/// GET /admin/query/metrics
pub async fn query_metrics(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.metrics.update_runtime_metrics();
    Ok(Json(state.metrics.snapshot()?))
}

/// GET /admin/query/eventlog - chain status across live instances.
pub async fn query_eventlog(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut logs = Vec::new();
    for id in state.runtime.list_active() {
        if let Some(instance) = state.runtime.get(&id) {
            if let Ok(status) = instance.eventlog_status() {
                logs.push(json!({ "tenantId": id, "status": status }));
            }
        }
    }
    Json(json!({ "eventlogs": logs }))
}

/// GET /admin/query/:id/mandates
pub async fn query_mandates(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<Json<serde_json::Value>> {
    let instance = state.runtime.get_or_create(&id).await?;
    Ok(Json(json!({ "mandates": instance.all_mandates()? })))
}

/// GET /admin/query/:id/reviews
pub async fn query_reviews(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<Json<serde_json::Value>> {
    let instance = state.runtime.get_or_create(&id).await?;
    Ok(Json(json!({ "reviews": instance.all_review_cases()? })))
}

/// GET /admin/query/:id/consequences
pub async fn query_consequences(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<Json<serde_json::Value>> {
    let instance = state.runtime.get_or_create(&id).await?;
    Ok(Json(json!({ "consequences": instance.all_observacoes()? })))
}

/// GET /admin/query/:id/dashboard - one-call tenant overview.
pub async fn query_dashboard(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<Json<serde_json::Value>> {
    let instance = state.runtime.get_or_create(&id).await?;
    let metrics = instance.metrics()?;
    let eventlog = instance.eventlog_status()?;
    let chain = instance.audit_verify_fast()?;
    Ok(Json(json!({
        "tenantId": id,
        "instance": metrics,
        "eventlog": eventlog,
        "chain": chain,
        "pendingReviews": instance
            .all_review_cases()?
            .iter()
            .filter(|r| !r.resolvido)
            .count(),
    })))
}

/// Create the `/admin/query` router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/tenants", get(query_tenants))
        .route("/instances", get(query_instances))
        .route("/metrics", get(query_metrics))
        .route("/eventlog", get(query_eventlog))
        .route("/:id/mandates", get(query_mandates))
        .route("/:id/reviews", get(query_reviews))
        .route("/:id/consequences", get(query_consequences))
        .route("/:id/dashboard", get(query_dashboard))
}
