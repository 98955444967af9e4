//! Public cognitive API (`/api/v1`).
//!
//! Every handler reads the tenant bound by the resolution hook and forwards
//! to that tenant's core instance. A path-scoped variant of the collection
//! endpoints is mounted under `/api/v1/tenants/:tenantId` for clients that
//! prefer tenant-in-URL addressing.

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use libervia_core::{EventLogStatus, EventRecord};
use libervia_kernel::{
    Decisao, DecisaoInput, Episodio, EpisodioStatus, Observacao, ObservacaoInput,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::middleware::tenant::ResolvedTenant;
use crate::state::AppState;

/// Default page size for event listings.
const DEFAULT_EVENT_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub entidade: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventListResponse {
    pub eventos: Vec<EventRecord>,
    pub total: u64,
    pub limit: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct EncerrarBody {
    #[serde(default)]
    pub resultado: Option<serde_json::Value>,
}

/// POST /api/v1/decisoes
pub async fn registrar_decisao(
    Extension(tenant): Extension<ResolvedTenant>,
    Json(input): Json<DecisaoInput>,
) -> ApiResult<(StatusCode, Json<Decisao>)> {
    if input.situacao.trim().is_empty() {
        return Err(ApiError::validation("situacao must not be empty"));
    }
    let decisao = tenant.instance.registrar_decisao(input)?;
    Ok((StatusCode::CREATED, Json(decisao)))
}

/// GET /api/v1/episodios/:id
pub async fn obter_episodio(
    Extension(tenant): Extension<ResolvedTenant>,
    Path(id): Path<String>,
) -> ApiResult<Json<Episodio>> {
    let episodio = tenant
        .instance
        .obter_episodio(&id)?
        .ok_or_else(|| ApiError::not_found(format!("episodio {} not found", id)))?;
    Ok(Json(episodio))
}

/// POST /api/v1/episodios/:id/encerrar
pub async fn encerrar_episodio(
    Extension(tenant): Extension<ResolvedTenant>,
    Path(id): Path<String>,
    body: Option<Json<EncerrarBody>>,
) -> ApiResult<Json<Episodio>> {
    let existing = tenant
        .instance
        .obter_episodio(&id)?
        .ok_or_else(|| ApiError::not_found(format!("episodio {} not found", id)))?;
    if existing.status == EpisodioStatus::Encerrado {
        return Err(ApiError::validation(format!(
            "episodio {} is already closed",
            id
        )));
    }
    let resultado = body.and_then(|Json(b)| b.resultado);
    let episodio = tenant.instance.encerrar_episodio(&id, resultado)?;
    Ok(Json(episodio))
}

/// POST /api/v1/observacoes
pub async fn registrar_observacao(
    Extension(tenant): Extension<ResolvedTenant>,
    Json(input): Json<ObservacaoInput>,
) -> ApiResult<(StatusCode, Json<Observacao>)> {
    if input.descricao.trim().is_empty() {
        return Err(ApiError::validation("descricao must not be empty"));
    }
    let observacao = tenant.instance.registrar_observacao(input)?;
    Ok((StatusCode::CREATED, Json(observacao)))
}

/// GET /api/v1/eventos
pub async fn listar_eventos(
    Extension(tenant): Extension<ResolvedTenant>,
    Query(query): Query<EventQuery>,
) -> ApiResult<Json<EventListResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT).clamp(1, 1000);
    let (eventos, total) = tenant
        .instance
        .listar_eventos(limit, query.entidade.as_deref())?;
    Ok(Json(EventListResponse {
        eventos,
        total,
        limit,
    }))
}

/// GET /api/v1/eventlog/status
pub async fn eventlog_status(
    Extension(tenant): Extension<ResolvedTenant>,
) -> ApiResult<Json<EventLogStatus>> {
    Ok(Json(tenant.instance.eventlog_status()?))
}

/// Collection endpoints (no `:id` captures), reused by both mounts.
fn collection_routes() -> Router<AppState> {
    Router::new()
        .route("/decisoes", post(registrar_decisao))
        .route("/observacoes", post(registrar_observacao))
        .route("/eventos", get(listar_eventos))
        .route("/eventlog/status", get(eventlog_status))
}

/// Create the public API router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(collection_routes())
        .route("/episodios/:id", get(obter_episodio))
        .route("/episodios/:id/encerrar", post(encerrar_episodio))
        // Tenant-in-path addressing of the collection endpoints
        .nest("/tenants/:tenant_id", collection_routes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_list_response_shape() -> Result<(), serde_json::Error> {
        let response = EventListResponse {
            eventos: Vec::new(),
            total: 0,
            limit: 50,
        };
        let json = serde_json::to_string(&response)?;
        assert_eq!(json, r#"{"eventos":[],"total":0,"limit":50}"#);
        Ok(())
    }

    #[test]
    fn test_encerrar_body_is_optional_content() -> Result<(), serde_json::Error> {
        let body: EncerrarBody = serde_json::from_str("{}")?;
        assert!(body.resultado.is_none());
        let body: EncerrarBody = serde_json::from_str(r#"{"resultado":{"ok":true}}"#)?;
        assert!(body.resultado.is_some());
        Ok(())
    }
}
