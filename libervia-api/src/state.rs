//! Shared application state for Axum routers.

use std::sync::Arc;

use libervia_backup::{BackupRepository, BackupService, DrService, RestoreService};
use libervia_tenancy::{GlobalAdminKeys, TenantRegistry, TenantRuntime};

use crate::config::ApiConfig;
use crate::middleware::rate_limit::RateLimiterState;
use crate::telemetry::GatewayMetrics;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub registry: Arc<TenantRegistry>,
    pub runtime: Arc<TenantRuntime>,
    pub global_admin: Arc<GlobalAdminKeys>,
    pub metrics: Arc<GatewayMetrics>,
    pub backups: Arc<BackupRepository>,
    /// Absent when `LIBERVIA_BACKUP_PEPPER` is not configured
    pub backup_service: Option<Arc<BackupService>>,
    pub restore_service: Option<Arc<RestoreService>>,
    pub dr: Arc<DrService>,
    pub rate_limiter: Arc<RateLimiterState>,
}

// Use macro to reduce boilerplate for FromRef implementations
crate::impl_from_ref!(Arc<ApiConfig>, config);
crate::impl_from_ref!(Arc<TenantRegistry>, registry);
crate::impl_from_ref!(Arc<TenantRuntime>, runtime);
crate::impl_from_ref!(Arc<GlobalAdminKeys>, global_admin);
crate::impl_from_ref!(Arc<GatewayMetrics>, metrics);
crate::impl_from_ref!(Arc<BackupRepository>, backups);
crate::impl_from_ref!(Arc<DrService>, dr);
crate::impl_from_ref!(Arc<RateLimiterState>, rate_limiter);
