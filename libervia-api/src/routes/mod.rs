//! Gateway Routes Module
//!
//! Route handlers grouped by surface, plus the top-level router builder
//! that wires the middleware pipeline in its fixed order.

pub mod admin;
pub mod backup;
pub mod health;
pub mod internal;
pub mod public;
pub mod query;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::middleware::{
    auth_middleware, rate_limit_middleware, request_id_middleware, tenant_resolution_middleware,
};
use crate::state::AppState;
use crate::telemetry::telemetry_middleware;

/// `GET /metrics` - public JSON snapshot (§public allow-list).
async fn public_metrics(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> crate::error::ApiResult<axum::Json<serde_json::Value>> {
    state.metrics.update_runtime_metrics();
    Ok(axum::Json(state.metrics.snapshot()?))
}

/// Build the complete gateway router with the middleware pipeline applied.
///
/// Hook order (outermost first): request-id, telemetry, tenant resolution,
/// auth, rate limit. Layers are applied innermost-first below because each
/// `.layer` call wraps everything added before it.
pub fn create_gateway_router(state: AppState) -> Router {
    let cors = if state.config.cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    Router::new()
        .nest("/health", health::create_router())
        .route("/metrics", get(public_metrics))
        .nest(
            "/admin",
            admin::create_router()
                .merge(backup::create_router())
                .nest("/query", query::create_router()),
        )
        .nest("/internal", internal::create_router())
        .nest("/api/v1", public::create_router())
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .layer(from_fn_with_state(
            state.clone(),
            tenant_resolution_middleware,
        ))
        .layer(from_fn_with_state(state.clone(), telemetry_middleware))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(cors)
        .with_state(state)
}
