//! Global and per-tenant administration surface (`/admin`).
//!
//! Route-level authorization is enforced by the auth hook; handlers here
//! assume the caller already cleared it (global_admin for lifecycle
//! operations, global_admin or the tenant's tenant_admin for the per-tenant
//! sub-resources).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use libervia_core::{
    AuthKeySummary, ChainVerification, CreatedKey, KeyId, KeyRole, Tenant, TenantFeatures,
    TenantId, TenantQuotas, TenantStatus, Timestamp,
};
use libervia_tenancy::{RegisterTenant, UpdateTenant};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ApiError, ApiResult};
use crate::routes::public::{EventListResponse, EventQuery};
use crate::state::AppState;

// ============================================================================
// VIEWS
// ============================================================================

/// Admin view of a tenant: credentials redacted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantView {
    pub id: TenantId,
    pub name: String,
    pub status: TenantStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub quotas: TenantQuotas,
    pub features: TenantFeatures,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub key_count: usize,
    pub has_legacy_token: bool,
}

impl From<&Tenant> for TenantView {
    fn from(tenant: &Tenant) -> Self {
        Self {
            id: tenant.id.clone(),
            name: tenant.name.clone(),
            status: tenant.status,
            created_at: tenant.created_at,
            updated_at: tenant.updated_at,
            quotas: tenant.quotas,
            features: tenant.features,
            metadata: tenant.metadata.clone(),
            key_count: tenant.keys.len(),
            has_legacy_token: tenant.api_token.is_some(),
        }
    }
}

/// Creation response: the only place a minted legacy token appears.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTenantResponse {
    #[serde(flatten)]
    pub tenant: TenantView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyBody {
    pub role: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn parse_role(raw: &str) -> ApiResult<KeyRole> {
    raw.parse::<KeyRole>()
        .map_err(|_| ApiError::validation(format!("role must be public or tenant_admin, got {}", raw)))
}

// ============================================================================
// TENANT LIFECYCLE (global_admin)
// ============================================================================

/// GET /admin/tenants
pub async fn list_tenants(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<serde_json::Value> {
    let tenants: Vec<TenantView> = state
        .registry
        .list(query.include_deleted)
        .await
        .iter()
        .map(TenantView::from)
        .collect();
    Json(serde_json::json!({ "tenants": tenants }))
}

/// POST /admin/tenants
pub async fn create_tenant(
    State(state): State<AppState>,
    Json(input): Json<RegisterTenant>,
) -> ApiResult<(StatusCode, Json<CreatedTenantResponse>)> {
    let tenant = state.registry.register(input).await?;
    state.metrics.set_tenants_total(state.registry.count().await);
    Ok((
        StatusCode::CREATED,
        Json(CreatedTenantResponse {
            tenant: TenantView::from(&tenant),
            api_token: tenant.api_token.clone(),
        }),
    ))
}

/// GET /admin/tenants/:id
pub async fn get_tenant(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<Json<TenantView>> {
    let tenant = state
        .registry
        .get(&id)
        .await
        .ok_or_else(|| ApiError::tenant_not_found(&id))?;
    Ok(Json(TenantView::from(&tenant)))
}

/// PATCH /admin/tenants/:id
pub async fn update_tenant(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
    Json(patch): Json<UpdateTenant>,
) -> ApiResult<Json<TenantView>> {
    let tenant = state.registry.update(&id, patch).await?;
    Ok(Json(TenantView::from(&tenant)))
}

/// DELETE /admin/tenants/:id - soft delete, data retained.
pub async fn remove_tenant(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<Json<TenantView>> {
    let tenant = state.registry.remove(&id).await?;
    state.runtime.shutdown(&id).await;
    state.metrics.set_tenants_total(state.registry.count().await);
    state
        .metrics
        .set_active_instances(state.runtime.instance_count());
    Ok(Json(TenantView::from(&tenant)))
}

/// POST /admin/tenants/:id/suspend
pub async fn suspend_tenant(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<Json<TenantView>> {
    let tenant = state.registry.suspend(&id).await?;
    // Evict the live instance so in-flight state cannot outlive suspension
    state.runtime.shutdown(&id).await;
    state
        .metrics
        .set_active_instances(state.runtime.instance_count());
    Ok(Json(TenantView::from(&tenant)))
}

/// POST /admin/tenants/:id/resume
pub async fn resume_tenant(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<Json<TenantView>> {
    let tenant = state.registry.resume(&id).await?;
    Ok(Json(TenantView::from(&tenant)))
}

/// POST /admin/tenants/:id/shutdown - evict the live instance only.
pub async fn shutdown_tenant(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.registry.exists(&id).await {
        return Err(ApiError::tenant_not_found(&id));
    }
    state.runtime.shutdown(&id).await;
    state
        .metrics
        .set_active_instances(state.runtime.instance_count());
    Ok(Json(serde_json::json!({ "shutdown": id })))
}

/// POST /admin/shutdown-all
pub async fn shutdown_all(State(state): State<AppState>) -> Json<serde_json::Value> {
    let count = state.runtime.instance_count();
    state.runtime.shutdown_all().await;
    state.metrics.set_active_instances(0);
    Json(serde_json::json!({ "shutdown": count }))
}

/// GET /admin/instances
pub async fn list_instances(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "instances": state.runtime.all_metrics() }))
}

/// GET /admin/metrics - JSON snapshot of the whole registry.
pub async fn admin_metrics(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.metrics.update_runtime_metrics();
    state
        .metrics
        .set_active_instances(state.runtime.instance_count());
    state.metrics.set_tenants_total(state.registry.count().await);
    Ok(Json(state.metrics.snapshot()?))
}

/// GET /admin/health - gateway-level summary.
pub async fn admin_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "uptimeSeconds": state.metrics.uptime_seconds(),
        "activeInstances": state.runtime.instance_count(),
        "tenantsTotal": state.registry.count().await,
    }))
}

// ============================================================================
// KEYS (global_admin or tenant_admin)
// ============================================================================

/// GET /admin/tenants/:id/keys - hashes never appear.
pub async fn list_keys(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<Json<serde_json::Value>> {
    let keys: Vec<AuthKeySummary> = state.registry.list_tenant_keys(&id).await?;
    Ok(Json(serde_json::json!({ "keys": keys })))
}

/// POST /admin/tenants/:id/keys - plaintext token returned exactly once.
pub async fn create_key(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
    Json(body): Json<CreateKeyBody>,
) -> ApiResult<(StatusCode, Json<CreatedKey>)> {
    let role = parse_role(&body.role)?;
    let created = state
        .registry
        .create_tenant_key(&id, role, body.description)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /admin/tenants/:id/keys/:keyId/revoke
pub async fn revoke_key(
    State(state): State<AppState>,
    Path((id, key_id)): Path<(TenantId, KeyId)>,
) -> ApiResult<Json<serde_json::Value>> {
    state.registry.revoke_tenant_key(&id, &key_id).await?;
    Ok(Json(serde_json::json!({ "revoked": key_id })))
}

/// POST /admin/tenants/:id/keys/rotate
pub async fn rotate_key(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
    Json(body): Json<CreateKeyBody>,
) -> ApiResult<(StatusCode, Json<CreatedKey>)> {
    let role = parse_role(&body.role)?;
    let created = state.registry.rotate_tenant_key(&id, role).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

// ============================================================================
// AUDIT AND EVENTS (global_admin or tenant_admin)
// ============================================================================

async fn instance_for(
    state: &AppState,
    id: &TenantId,
) -> ApiResult<std::sync::Arc<libervia_kernel::CoreInstance>> {
    Ok(state.runtime.get_or_create(id).await?)
}

/// GET /admin/tenants/:id/audit/verify - full chain walk.
pub async fn audit_verify(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<Json<ChainVerification>> {
    let instance = instance_for(&state, &id).await?;
    Ok(Json(instance.audit_verify()?))
}

/// GET /admin/tenants/:id/audit/verify-fast - tail window walk.
pub async fn audit_verify_fast(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<Json<ChainVerification>> {
    let instance = instance_for(&state, &id).await?;
    Ok(Json(instance.audit_verify_fast()?))
}

/// GET /admin/tenants/:id/audit/export - JSONL stream of the chain.
pub async fn audit_export(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<impl IntoResponse> {
    let instance = instance_for(&state, &id).await?;
    let body = instance.audit_export()?;
    Ok((
        StatusCode::OK,
        [("content-type", "application/x-ndjson")],
        body,
    ))
}

/// GET /admin/tenants/:id/audit/replay - per-entity event projection.
pub async fn audit_replay(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<Json<serde_json::Value>> {
    let instance = instance_for(&state, &id).await?;
    let counts = instance.audit_replay()?;
    Ok(Json(serde_json::json!({ "entities": counts })))
}

/// GET /admin/tenants/:id/events - same contract as the public listing.
pub async fn tenant_events(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
    Query(query): Query<EventQuery>,
) -> ApiResult<Json<EventListResponse>> {
    let instance = instance_for(&state, &id).await?;
    let limit = query.limit.unwrap_or(50).clamp(1, 1000);
    let (eventos, total) = instance.listar_eventos(limit, query.entidade.as_deref())?;
    Ok(Json(EventListResponse {
        eventos,
        total,
        limit,
    }))
}

/// GET /admin/tenants/:id/metrics
pub async fn tenant_metrics(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> ApiResult<Json<serde_json::Value>> {
    let instance = instance_for(&state, &id).await?;
    let metrics = instance.metrics()?;
    Ok(Json(serde_json::json!({ "instance": metrics })))
}

// ============================================================================
// ADMIN UI (placeholder; assets ship separately)
// ============================================================================

/// GET /admin/ui -> 302 /admin/ui/
pub async fn ui_redirect() -> impl IntoResponse {
    (StatusCode::FOUND, [("location", "/admin/ui/")])
}

/// GET /admin/ui/ - minimal index so the mount is never a 404.
pub async fn ui_index() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/html; charset=utf-8")],
        "<!doctype html><title>Libervia Admin</title><h1>Libervia Admin</h1>",
    )
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the `/admin` router (backup/DR routes are mounted separately).
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/tenants", get(list_tenants).post(create_tenant))
        .route(
            "/tenants/:id",
            get(get_tenant).patch(update_tenant).delete(remove_tenant),
        )
        .route("/tenants/:id/suspend", post(suspend_tenant))
        .route("/tenants/:id/resume", post(resume_tenant))
        .route("/tenants/:id/shutdown", post(shutdown_tenant))
        .route("/shutdown-all", post(shutdown_all))
        .route("/instances", get(list_instances))
        .route("/metrics", get(admin_metrics))
        .route("/health", get(admin_health))
        .route("/tenants/:id/keys", get(list_keys).post(create_key))
        .route("/tenants/:id/keys/:key_id/revoke", post(revoke_key))
        .route("/tenants/:id/keys/rotate", post(rotate_key))
        .route("/tenants/:id/audit/verify", get(audit_verify))
        .route("/tenants/:id/audit/verify-fast", get(audit_verify_fast))
        .route("/tenants/:id/audit/export", get(audit_export))
        .route("/tenants/:id/audit/replay", get(audit_replay))
        .route("/tenants/:id/events", get(tenant_events))
        .route("/tenants/:id/metrics", get(tenant_metrics))
        .route("/ui", get(ui_redirect))
        .route("/ui/", get(ui_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_tenant_view_redacts_credentials() -> Result<(), serde_json::Error> {
        let tenant = Tenant {
            id: TenantId::new("acme"),
            name: "ACME".to_string(),
            status: TenantStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            quotas: TenantQuotas::default(),
            features: TenantFeatures::default(),
            metadata: BTreeMap::new(),
            api_token: Some("legacy-secret".to_string()),
            keys: Vec::new(),
        };
        let json = serde_json::to_string(&TenantView::from(&tenant))?;
        assert!(!json.contains("legacy-secret"));
        assert!(json.contains("\"hasLegacyToken\":true"));
        Ok(())
    }

    #[test]
    fn test_parse_role() {
        assert!(parse_role("public").is_ok());
        assert!(parse_role("tenant_admin").is_ok());
        assert!(parse_role("global_admin").is_err());
        assert!(parse_role("root").is_err());
    }
}
