//! Tenant-resolution hook.
//!
//! Runs the tenant router over header, path, and host; refuses conflicting
//! identifiers; binds the tenant id and its live core instance to the
//! request. Skipped for the gateway's own namespaces (`/health`, `/admin`,
//! `/metrics`, `/internal`), whose tenant scoping - where it exists - comes
//! from the URL path inside the auth hook.

use axum::extract::State;
use axum::http::Request;
use axum::{body::Body, middleware::Next, response::Response};
use libervia_core::{LiberviaError, TenantError, TenantId};
use libervia_kernel::CoreInstance;
use libervia_tenancy::router::extract_tenant_id_with_conflict_detection;
use libervia_tenancy::security::validate_tenant_id;
use std::sync::Arc;

use crate::error::ApiError;
use crate::middleware::request_id::RequestId;
use crate::state::AppState;

/// Prefixes the resolution hook does not apply to.
const SKIP_PREFIXES: [&str; 4] = ["/health", "/admin", "/metrics", "/internal"];

/// The resolved tenant bound to a request (and mirrored onto the response
/// for the telemetry hook).
#[derive(Clone)]
pub struct ResolvedTenant {
    pub id: TenantId,
    pub instance: Arc<CoreInstance>,
    /// Requests per minute from the tenant's quota; 0 = unlimited
    pub rate_limit_rpm: u32,
}

/// Tenant-resolution middleware.
pub async fn tenant_resolution_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();
    if SKIP_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return Ok(next.run(request).await);
    }

    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone());
    let attach_id = |err: ApiError| match &request_id {
        Some(id) => err.with_request_id(id.clone()),
        None => err,
    };

    let header = request
        .headers()
        .get("x-tenant-id")
        .and_then(|h| h.to_str().ok());
    let host = request
        .headers()
        .get("host")
        .and_then(|h| h.to_str().ok());

    let resolution = extract_tenant_id_with_conflict_detection(header, &path, host);

    if resolution.has_conflict {
        state.metrics.record_tenant_conflict(None);
        let details = serde_json::to_value(&resolution.conflict_details)
            .unwrap_or(serde_json::Value::Null);
        tracing::warn!(path = %path, "refusing request with conflicting tenant identifiers");
        return Err(attach_id(ApiError::tenant_conflict(details)));
    }

    let Some(raw_id) = resolution.tenant_id else {
        return Err(attach_id(ApiError::missing_tenant()));
    };

    let tenant_id = validate_tenant_id(&raw_id).map_err(|e| attach_id(e.into()))?;

    let instance = match state.runtime.get_or_create(&tenant_id).await {
        Ok(instance) => instance,
        Err(LiberviaError::Tenant(TenantError::NotFound { id }))
        | Err(LiberviaError::Tenant(TenantError::Deleted { id })) => {
            return Err(attach_id(ApiError::tenant_not_found(id)));
        }
        Err(LiberviaError::Tenant(TenantError::Suspended { id })) => {
            return Err(attach_id(ApiError::tenant_suspended(id)));
        }
        Err(e) => return Err(attach_id(e.into())),
    };

    let rate_limit_rpm = state
        .registry
        .get(&tenant_id)
        .await
        .map(|t| t.quotas.rate_limit_rpm)
        .unwrap_or(0);

    let resolved = ResolvedTenant {
        id: tenant_id,
        instance,
        rate_limit_rpm,
    };
    request.extensions_mut().insert(resolved.clone());

    let mut response = next.run(request).await;
    // Mirror onto the response so the (outer) telemetry hook can label
    response.extensions_mut().insert(resolved);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_prefixes_cover_gateway_namespaces() {
        for path in ["/health", "/health/ready", "/admin/tenants", "/metrics", "/internal/metrics"] {
            assert!(SKIP_PREFIXES.iter().any(|p| path.starts_with(p)), "{}", path);
        }
        for path in ["/api/v1/eventos", "/api/v1/tenants/acme/eventos"] {
            assert!(!SKIP_PREFIXES.iter().any(|p| path.starts_with(p)), "{}", path);
        }
    }
}
