//! Tenant identifier extraction with cross-source conflict detection.
//!
//! A request may name its tenant three ways: the `X-Tenant-Id` header, a
//! tenant-scoped URL path, or the first label of the `Host` header. When
//! more than one source speaks and they disagree, the request is refused
//! rather than guessed at.

use serde::{Deserialize, Serialize};

use crate::security::normalize_tenant_id;

/// Where each extractor's value came from, for the conflict payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_tenant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_tenant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_tenant: Option<String>,
}

/// Outcome of running all extractors over one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantResolution {
    pub tenant_id: Option<String>,
    pub has_conflict: bool,
    pub conflict_details: Option<ConflictDetails>,
}

/// Path prefixes under `/admin/query/` that are global operations, not
/// tenant ids.
const RESERVED_QUERY_ROUTES: [&str; 4] = ["tenants", "instances", "metrics", "eventlog"];

/// Run header, path, and subdomain extraction; detect disagreements.
pub fn extract_tenant_id_with_conflict_detection(
    header: Option<&str>,
    path: &str,
    host: Option<&str>,
) -> TenantResolution {
    let header_tenant = header
        .map(normalize_tenant_id)
        .filter(|s| !s.is_empty());
    let path_tenant = extract_from_path(path).map(|s| normalize_tenant_id(&s));
    let host_tenant = host.and_then(extract_from_host);

    let mut values: Vec<&String> = Vec::new();
    for value in [&header_tenant, &path_tenant, &host_tenant].into_iter().flatten() {
        values.push(value);
    }

    let mut distinct = values.clone();
    distinct.sort();
    distinct.dedup();

    if distinct.len() > 1 {
        return TenantResolution {
            tenant_id: None,
            has_conflict: true,
            conflict_details: Some(ConflictDetails {
                header_tenant,
                path_tenant,
                host_tenant,
            }),
        };
    }

    TenantResolution {
        tenant_id: values.first().map(|s| (*s).clone()),
        has_conflict: false,
        conflict_details: None,
    }
}

/// Match `/api/v1/tenants/:id/...`, `/admin/tenants/:id/...` and
/// `/admin/query/:id/...` (minus the reserved query sub-routes).
pub fn extract_from_path(path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["api", "v1", "tenants", id, ..] => Some((*id).to_string()),
        ["admin", "tenants", id, ..] => Some((*id).to_string()),
        ["admin", "query", id, ..] if !RESERVED_QUERY_ROUTES.contains(id) => {
            Some((*id).to_string())
        }
        _ => None,
    }
}

/// First label of a host with at least three labels, unless it is the bare
/// `www`/`api` front.
pub fn extract_from_host(host: &str) -> Option<String> {
    let hostname = host.split(':').next().unwrap_or(host);
    let labels: Vec<&str> = hostname.split('.').collect();
    if labels.len() < 3 {
        return None;
    }
    let first = normalize_tenant_id(labels[0]);
    if first.is_empty() || first == "www" || first == "api" {
        return None;
    }
    Some(first)
}
