//! Auth/RBAC hook.
//!
//! Tokens arrive as `Authorization: Bearer <token>`. Three roles exist:
//! `public` and `tenant_admin` live on the tenant; `global_admin` lives in
//! the process-wide key set. Route classes decide which roles clear a
//! request:
//!
//! - open routes (`/health`, `/metrics`, `/admin/ui/**`) need no token;
//! - global admin surfaces need `global_admin`;
//! - per-tenant admin surfaces accept `global_admin` or that tenant's
//!   `tenant_admin`;
//! - the public API accepts any of the tenant's keys, with a dev-mode
//!   passthrough for tenants that have no credentials configured at all.

use axum::extract::State;
use axum::http::Request;
use axum::{body::Body, middleware::Next, response::Response};
use libervia_core::{KeyId, KeyRole};
use libervia_tenancy::registry::TenantAuthContext;
use libervia_tenancy::router::extract_from_path;

use crate::error::ApiError;
use crate::middleware::request_id::RequestId;
use crate::middleware::tenant::ResolvedTenant;
use crate::state::AppState;

// ============================================================================
// ROUTE CLASSIFICATION
// ============================================================================

/// Authorization class of a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteClass {
    /// Public allow-list; no token required
    Open,
    /// Global admin operations
    AdminGlobal,
    /// Per-tenant admin operations (tenant id from the path)
    AdminTenant(String),
    /// Internal global operations
    InternalGlobal,
    /// Internal per-tenant operations
    InternalTenant(String),
    /// The tenant-facing cognitive API
    PublicApi,
    /// No known namespace; the router will 404
    Unmatched,
}

/// Per-tenant sub-resources of `/admin/tenants/:id/...` that tenant admins
/// may reach. Lifecycle operations (suspend/resume/shutdown, PATCH/DELETE)
/// stay global-admin only.
const TENANT_ADMIN_SURFACES: [&str; 5] = ["audit", "events", "keys", "metrics", "backup"];

/// Classify a request path.
pub fn classify(path: &str) -> RouteClass {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["health", ..] | ["metrics"] => RouteClass::Open,
        ["admin", "ui", ..] => RouteClass::Open,
        ["admin", "tenants", id, surface, ..]
            if TENANT_ADMIN_SURFACES.contains(surface) =>
        {
            RouteClass::AdminTenant((*id).to_string())
        }
        ["admin", "query", ..] => match extract_from_path(path) {
            Some(id) => RouteClass::AdminTenant(id),
            None => RouteClass::AdminGlobal,
        },
        ["admin", ..] => RouteClass::AdminGlobal,
        ["internal", "tenants", id, ..] => RouteClass::InternalTenant((*id).to_string()),
        ["internal", ..] => RouteClass::InternalGlobal,
        ["api", "v1", ..] => RouteClass::PublicApi,
        _ => RouteClass::Unmatched,
    }
}

// ============================================================================
// AUTH ACTOR
// ============================================================================

/// Who cleared authentication, bound to the request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthActor {
    GlobalAdmin { key_id: KeyId },
    Tenant(TenantAuthContext),
    /// Tenant with no credentials configured (development convenience)
    DevMode,
}

// ============================================================================
// MIDDLEWARE
// ============================================================================

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Auth middleware; runs after tenant resolution and before rate limiting.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();
    let class = classify(&path);

    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone());
    let finish = |err: ApiError, tenant: Option<&str>, state: &AppState| {
        state.metrics.record_auth_failure(tenant);
        match &request_id {
            Some(id) => err.with_request_id(id.clone()),
            None => err,
        }
    };

    let actor = match &class {
        RouteClass::Open | RouteClass::Unmatched => None,

        RouteClass::AdminGlobal | RouteClass::InternalGlobal => {
            let Some(token) = bearer_token(&request) else {
                return Err(finish(ApiError::missing_token(), None, &state));
            };
            match state.global_admin.validate(token) {
                Some(key_id) => Some(AuthActor::GlobalAdmin { key_id }),
                None => return Err(finish(ApiError::invalid_token(), None, &state)),
            }
        }

        RouteClass::AdminTenant(tenant) | RouteClass::InternalTenant(tenant) => {
            let Some(token) = bearer_token(&request) else {
                return Err(finish(ApiError::missing_token(), Some(tenant.as_str()), &state));
            };
            if let Some(key_id) = state.global_admin.validate(token) {
                Some(AuthActor::GlobalAdmin { key_id })
            } else {
                let tenant_id = libervia_core::TenantId::new(tenant.clone());
                match state.registry.validate_tenant_token(&tenant_id, token).await {
                    Some(ctx) if ctx.role == KeyRole::TenantAdmin => {
                        Some(AuthActor::Tenant(ctx))
                    }
                    Some(_) => {
                        return Err(finish(
                            ApiError::insufficient_role(),
                            Some(tenant.as_str()),
                            &state,
                        ))
                    }
                    None => {
                        return Err(finish(ApiError::invalid_token(), Some(tenant.as_str()), &state))
                    }
                }
            }
        }

        RouteClass::PublicApi => {
            let Some(resolved) = request.extensions().get::<ResolvedTenant>().cloned() else {
                return Err(finish(ApiError::missing_tenant(), None, &state));
            };
            let tenant = state.registry.get(&resolved.id).await;
            let has_credentials = tenant
                .as_ref()
                .map(|t| !t.keys.is_empty() || t.api_token.is_some())
                .unwrap_or(false);

            match bearer_token(&request) {
                None if !has_credentials => Some(AuthActor::DevMode),
                None => {
                    return Err(finish(
                        ApiError::missing_token(),
                        Some(resolved.id.as_str()),
                        &state,
                    ))
                }
                Some(token) => {
                    match state.registry.validate_tenant_token(&resolved.id, token).await {
                        Some(ctx) => Some(AuthActor::Tenant(ctx)),
                        None => {
                            return Err(finish(
                                ApiError::invalid_token(),
                                Some(resolved.id.as_str()),
                                &state,
                            ))
                        }
                    }
                }
            }
        }
    };

    if let Some(actor) = actor {
        match &actor {
            AuthActor::GlobalAdmin { key_id } => {
                tracing::debug!(key_id = %key_id, path = %path, "global admin request");
            }
            AuthActor::Tenant(ctx) => {
                tracing::debug!(
                    tenant_id = %ctx.tenant_id,
                    key_id = %ctx.key_id,
                    role = %ctx.role,
                    path = %path,
                    "tenant-authenticated request"
                );
            }
            AuthActor::DevMode => {
                tracing::debug!(path = %path, "dev-mode request without credentials");
            }
        }
        request.extensions_mut().insert(actor);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_routes() {
        assert_eq!(classify("/health"), RouteClass::Open);
        assert_eq!(classify("/health/ready"), RouteClass::Open);
        assert_eq!(classify("/metrics"), RouteClass::Open);
        assert_eq!(classify("/admin/ui/index.html"), RouteClass::Open);
    }

    #[test]
    fn test_admin_global_routes() {
        for path in [
            "/admin/tenants",
            "/admin/tenants/acme",
            "/admin/tenants/acme/suspend",
            "/admin/tenants/acme/resume",
            "/admin/tenants/acme/shutdown",
            "/admin/shutdown-all",
            "/admin/metrics",
            "/admin/health",
            "/admin/instances",
            "/admin/query/tenants",
            "/admin/query/eventlog",
            "/admin/backups",
            "/admin/restore",
            "/admin/dr/procedures",
        ] {
            assert_eq!(classify(path), RouteClass::AdminGlobal, "{}", path);
        }
    }

    #[test]
    fn test_admin_tenant_routes() {
        for path in [
            "/admin/tenants/acme/audit/verify",
            "/admin/tenants/acme/events",
            "/admin/tenants/acme/keys",
            "/admin/tenants/acme/keys/key_1/revoke",
            "/admin/tenants/acme/metrics",
            "/admin/tenants/acme/backup",
            "/admin/query/acme/dashboard",
        ] {
            assert_eq!(
                classify(path),
                RouteClass::AdminTenant("acme".to_string()),
                "{}",
                path
            );
        }
    }

    #[test]
    fn test_internal_routes() {
        assert_eq!(classify("/internal/metrics"), RouteClass::InternalGlobal);
        assert_eq!(
            classify("/internal/health/operational"),
            RouteClass::InternalGlobal
        );
        assert_eq!(
            classify("/internal/tenants/acme/metrics"),
            RouteClass::InternalTenant("acme".to_string())
        );
    }

    #[test]
    fn test_public_api_routes() {
        assert_eq!(classify("/api/v1/eventos"), RouteClass::PublicApi);
        assert_eq!(
            classify("/api/v1/tenants/acme/eventos"),
            RouteClass::PublicApi
        );
    }

    #[test]
    fn test_unmatched() {
        assert_eq!(classify("/favicon.ico"), RouteClass::Unmatched);
        assert_eq!(classify("/"), RouteClass::Unmatched);
    }
}
