//! HTTP telemetry hook.
//!
//! Wraps every request: captures a monotonic start time, lets the rest of
//! the pipeline run, then records the request counter, latency histogram
//! and error-category counter. The route label comes from axum's matched
//! route pattern; raw URLs only feed the label after ID-collapsing, so
//! label cardinality stays bounded.

use axum::extract::{MatchedPath, State};
use axum::{body::Body, middleware::Next, response::Response};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Instant;

use crate::middleware::tenant::ResolvedTenant;
use crate::state::AppState;

static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
    ) {
        Ok(pattern) => pattern,
        Err(e) => unreachable!("invalid uuid pattern: {}", e),
    }
});

static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(r"^\d+$") {
        Ok(pattern) => pattern,
        Err(e) => unreachable!("invalid numeric pattern: {}", e),
    }
});

/// Long opaque lowercase identifiers (generated entity ids).
static OPAQUE_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(r"^[a-z0-9_]{24,}$") {
        Ok(pattern) => pattern,
        Err(e) => unreachable!("invalid identifier pattern: {}", e),
    }
});

/// Collapse dynamic path segments to `:id`. Fallback for requests that
/// matched no route; matched routes use the router's own template.
pub fn normalize_path(path: &str) -> String {
    let collapsed: Vec<String> = path
        .split('/')
        .map(|segment| {
            if UUID_SEGMENT.is_match(segment)
                || NUMERIC_SEGMENT.is_match(segment)
                || OPAQUE_SEGMENT.is_match(segment)
            {
                ":id".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect();
    collapsed.join("/")
}

/// Telemetry middleware for the gateway pipeline.
pub async fn telemetry_middleware(
    State(state): State<AppState>,
    request: axum::http::Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let raw_path = request.uri().path().to_string();

    // Prefer the matched route pattern; never label with the raw URL
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| normalize_path(&raw_path));

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    let tenant_id = response
        .extensions()
        .get::<ResolvedTenant>()
        .map(|t| t.id.as_str().to_string());

    state.metrics.record_http_request(
        method.as_str(),
        &route,
        status,
        tenant_id.as_deref(),
        duration_ms,
    );

    tracing::info!(
        method = %method,
        path = %raw_path,
        route = %route,
        status = status,
        duration_ms = duration_ms as u64,
        "Request completed"
    );

    response
}
