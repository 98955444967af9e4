//! Middleware hooks of the gateway pipeline.
//!
//! # Hook order
//!
//! The order is fixed; outermost first:
//!
//! 1. `request_id` - accept or mint `X-Request-Id`, echo it back
//! 2. telemetry (in `crate::telemetry`) - times the request, records metrics
//! 3. `tenant` - tenant resolution with conflict detection
//! 4. `auth` - token validation and role enforcement
//! 5. `rate_limit` - per-tenant fixed-window admission
//!
//! Telemetry sits outside tenant/auth/rate-limit so refusals from those
//! hooks still land in the request metrics.

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod tenant;

pub use auth::{auth_middleware, classify, AuthActor, RouteClass};
pub use rate_limit::{rate_limit_middleware, RateLimiterState};
pub use request_id::{request_id_middleware, RequestId, REQUEST_ID_HEADER};
pub use tenant::{tenant_resolution_middleware, ResolvedTenant};
