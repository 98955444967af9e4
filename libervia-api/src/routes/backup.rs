//! Backup, restore and DR surface (mounted under `/admin`).
//!
//! Snapshot creation is available to the tenant's admin; everything else
//! (listing, restore, DR) is global_admin, enforced by the auth hook.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use libervia_backup::{BackupService, RestoreOptions, RestoreService};
use libervia_core::{
    BackupEntityType, BackupId, BackupSnapshot, DrProcedureType, RestoreReport, TenantId,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::backup_bridge::{KernelDataProvider, KernelRestoreTarget};
use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::state::AppState;

fn backup_service(state: &AppState) -> ApiResult<Arc<BackupService>> {
    state
        .backup_service
        .clone()
        .ok_or_else(|| ApiError::from_code(ErrorCode::BackupConfigMissing))
}

fn restore_service(state: &AppState) -> ApiResult<Arc<RestoreService>> {
    state
        .restore_service
        .clone()
        .ok_or_else(|| ApiError::from_code(ErrorCode::BackupConfigMissing))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBackupBody {
    /// Entity types to include; defaults to all
    #[serde(default)]
    pub include_entities: Option<Vec<BackupEntityType>>,
}

/// POST /admin/tenants/:id/backup
pub async fn create_backup(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
    body: Option<Json<CreateBackupBody>>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let service = backup_service(&state)?;
    let tenant = state
        .registry
        .get(&id)
        .await
        .ok_or_else(|| ApiError::tenant_not_found(&id))?;
    if !tenant.features.backup_enabled {
        return Err(ApiError::validation(format!(
            "backups are disabled for tenant {}",
            id
        )));
    }

    let included = body
        .and_then(|Json(b)| b.include_entities)
        .unwrap_or_else(|| BackupEntityType::ALL.to_vec());

    let instance = state.runtime.get_or_create(&id).await?;
    let provider = KernelDataProvider {
        instance,
        registry: Arc::clone(&state.registry),
        tenant_id: id.clone(),
    };
    let snapshot = service.create_backup(&id, &included, &provider).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "metadata": snapshot.metadata })),
    ))
}

/// GET /admin/backups
pub async fn list_backups(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    Ok(Json(json!({ "backups": state.backups.list()? })))
}

/// GET /admin/backups/:backupId
pub async fn get_backup(
    State(state): State<AppState>,
    Path(backup_id): Path<BackupId>,
) -> ApiResult<Json<BackupSnapshot>> {
    Ok(Json(state.backups.load(&backup_id)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreBody {
    pub backup_id: BackupId,
    /// Defaults to a dry run; effective restores must opt in
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    #[serde(default)]
    pub include_entities: Option<Vec<BackupEntityType>>,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[serde(default = "default_verify_continuity")]
    pub verify_eventlog_continuity: bool,
}

fn default_dry_run() -> bool {
    true
}

fn default_verify_continuity() -> bool {
    true
}

/// POST /admin/restore
pub async fn restore(
    State(state): State<AppState>,
    Json(body): Json<RestoreBody>,
) -> ApiResult<Json<RestoreReport>> {
    let service = restore_service(&state)?;

    // Resolve the snapshot's tenant so the target binds the right instance
    let snapshot = state.backups.load(&body.backup_id)?;
    let tenant_id = snapshot.metadata.tenant_id.clone();
    let instance = state.runtime.get_or_create(&tenant_id).await?;
    let target = KernelRestoreTarget { instance };

    let options = RestoreOptions {
        backup_id: body.backup_id,
        dry_run: body.dry_run,
        include_entities: body.include_entities,
        tenant_id: body.tenant_id,
        verify_eventlog_continuity: body.verify_eventlog_continuity,
    };
    let report = service.restore(&options, &target).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDrBody {
    #[serde(rename = "type")]
    pub procedure_type: DrProcedureType,
    #[serde(default)]
    pub backup_id: Option<BackupId>,
}

/// POST /admin/dr/procedures
pub async fn start_dr(
    State(state): State<AppState>,
    Json(body): Json<StartDrBody>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let procedure = state.dr.start(body.procedure_type, body.backup_id).await;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "procedure": procedure })),
    ))
}

/// GET /admin/dr/procedures/:id
pub async fn get_dr(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let procedure = state
        .dr
        .get(&id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("DR procedure {} not found", id)))?;
    Ok(Json(json!({ "procedure": procedure })))
}

/// POST /admin/dr/procedures/:id/confirm - the operator gate.
pub async fn confirm_dr(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let procedure = state.dr.confirm(&id).await?;
    Ok(Json(json!({ "procedure": procedure })))
}

/// Create the backup/restore/DR routes (merged into `/admin`).
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/tenants/:id/backup", post(create_backup))
        .route("/backups", get(list_backups))
        .route("/backups/:backup_id", get(get_backup))
        .route("/restore", post(restore))
        .route("/dr/procedures", post(start_dr))
        .route("/dr/procedures/:id", get(get_dr))
        .route("/dr/procedures/:id/confirm", post(confirm_dr))
}
