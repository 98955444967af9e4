//! Libervia API - Multi-Tenant HTTP Gateway
//!
//! This crate is the HTTP face of the Libervia decision kernel: a
//! role-based gateway that resolves tenants, enforces auth and rate
//! limits, forwards cognitive operations to per-tenant core instances,
//! and exposes admin, query, metrics and backup/restore surfaces.

pub mod backup_bridge;
pub mod boot;
pub mod config;
pub mod error;
pub mod macros;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use boot::{build_state, BootOptions};
pub use config::{ApiConfig, Environment};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{
    auth_middleware, classify, rate_limit_middleware, request_id_middleware,
    tenant_resolution_middleware, AuthActor, RateLimiterState, RequestId, ResolvedTenant,
    RouteClass, REQUEST_ID_HEADER,
};
pub use routes::create_gateway_router;
pub use state::AppState;
pub use telemetry::{normalize_path, telemetry_middleware, GatewayMetrics};
