//! Request-id hook.
//!
//! The first hook in the pipeline: accepts a well-formed `X-Request-Id`
//! verbatim, generates a UUIDv4 otherwise, stores it in the request
//! extensions for log correlation, and echoes it on the response.

use axum::http::{HeaderValue, Request};
use axum::{body::Body, middleware::Next, response::Response};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

static REQUEST_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(r"^[A-Za-z0-9_-]{1,64}$") {
        Ok(pattern) => pattern,
        Err(e) => unreachable!("invalid request id pattern: {}", e),
    }
});

/// Request id bound to the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Accept the inbound id only when it matches the safe charset.
fn resolve_request_id(header: Option<&str>) -> String {
    match header {
        Some(candidate) if REQUEST_ID_PATTERN.is_match(candidate) => candidate.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

/// Request-id middleware; outermost hook of the pipeline.
pub async fn request_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let inbound = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok());
    let request_id = resolve_request_id(inbound);

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
