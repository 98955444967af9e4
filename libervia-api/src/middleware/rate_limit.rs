//! Per-tenant rate limiting.
//!
//! Fixed 60-second windows keyed by tenant id. Limits come from the
//! tenant's quota (`rateLimitRpm`; 0 disables the limit). Requests without
//! a resolved tenant skip the limiter entirely. Responses carry the
//! advisory `X-RateLimit-Limit/Remaining/Reset` headers; denials add
//! `Retry-After`.

use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::{body::Body, middleware::Next, response::Response};
use dashmap::DashMap;
use libervia_core::TenantId;
use std::time::{Duration, Instant};

use crate::error::ApiError;
use crate::middleware::request_id::RequestId;
use crate::middleware::tenant::ResolvedTenant;
use crate::state::AppState;

/// One tenant's current window.
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window counters, one per tenant.
pub struct RateLimiterState {
    windows: DashMap<TenantId, Window>,
    window: Duration,
}

/// Outcome of one admission check.
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_secs: u64,
}

impl RateLimiterState {
    pub fn new(window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            window,
        }
    }

    /// Count one request against the tenant's window. The critical section
    /// is one DashMap entry: increment plus header math.
    pub fn check(&self, tenant_id: &TenantId, limit: u32) -> RateDecision {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(tenant_id.clone())
            .or_insert_with(|| Window {
                started: now,
                count: 0,
            });

        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        let elapsed = now.duration_since(entry.started);
        let reset_secs = self.window.saturating_sub(elapsed).as_secs().max(1);

        if entry.count >= limit {
            return RateDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_secs,
            };
        }

        entry.count += 1;
        RateDecision {
            allowed: true,
            limit,
            remaining: limit - entry.count,
            reset_secs,
        }
    }
}

fn header_u64(value: u64) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

/// Rate-limit middleware; runs after auth, immediately before the handler.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(resolved) = request.extensions().get::<ResolvedTenant>().cloned() else {
        // Non-tenant routes are not limited
        return Ok(next.run(request).await);
    };

    if resolved.rate_limit_rpm == 0 {
        return Ok(next.run(request).await);
    }

    let decision = state
        .rate_limiter
        .check(&resolved.id, resolved.rate_limit_rpm);

    if !decision.allowed {
        state.metrics.record_rate_limited(resolved.id.as_str());
        tracing::warn!(tenant_id = %resolved.id, "rate limit exceeded");
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .map(|r| r.0.clone());
        let mut err = ApiError::rate_limited(decision.reset_secs);
        if let Some(id) = request_id {
            err = err.with_request_id(id);
        }
        let mut response = err.into_response_with_tenant(&resolved);
        let headers = response.headers_mut();
        headers.insert("retry-after", header_u64(decision.reset_secs));
        headers.insert("x-ratelimit-limit", header_u64(decision.limit as u64));
        headers.insert("x-ratelimit-remaining", header_u64(0));
        headers.insert("x-ratelimit-reset", header_u64(decision.reset_secs));
        return Ok(response);
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", header_u64(decision.limit as u64));
    headers.insert(
        "x-ratelimit-remaining",
        header_u64(decision.remaining as u64),
    );
    headers.insert("x-ratelimit-reset", header_u64(decision.reset_secs));
    Ok(response)
}

impl ApiError {
    /// Build the 429 response with the tenant mirrored for telemetry.
    fn into_response_with_tenant(self, resolved: &ResolvedTenant) -> Response {
        use axum::response::IntoResponse;
        let mut response = self.into_response();
        response.extensions_mut().insert(resolved.clone());
        response
    }
}
