//! Telemetry for the gateway: metric registry, HTTP hook, operational
//! health aggregation.

pub mod metrics;
pub mod middleware;
pub mod operational;

pub use metrics::GatewayMetrics;
pub use middleware::{normalize_path, telemetry_middleware};
pub use operational::assess;
