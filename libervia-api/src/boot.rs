//! State construction shared by `main` and the integration tests.
//!
//! Everything global-looking (pepper, metrics registry, clock-ish state)
//! is constructed here once and injected through `AppState`, so tests can
//! boot as many isolated gateways as they need.

use std::sync::Arc;

use libervia_backup::{
    BackupCallback, BackupPepper, BackupRepository, BackupService, DrService, RestoreService,
};
use libervia_tenancy::{AuthPepper, GlobalAdminKeys, TenantRegistry, TenantRuntime};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::rate_limit::RateLimiterState;
use crate::state::AppState;
use crate::telemetry::GatewayMetrics;

/// Inputs for building one gateway's state.
pub struct BootOptions {
    pub config: ApiConfig,
    pub auth_pepper: AuthPepper,
    /// Absent = backup/restore endpoints answer `BACKUP_CONFIG_MISSING`
    pub backup_pepper: Option<BackupPepper>,
}

/// Build the full application state. Fatal errors here must abort boot.
pub async fn build_state(options: BootOptions) -> ApiResult<AppState> {
    let config = Arc::new(options.config);

    let registry = TenantRegistry::open(&config.base_dir, options.auth_pepper.clone())
        .map_err(ApiError::from)?;
    registry.spawn_last_used_writer();

    let global_admin = Arc::new(
        GlobalAdminKeys::load(
            &config.base_dir,
            options.auth_pepper,
            config.admin_token.clone(),
        )
        .map_err(ApiError::from)?,
    );
    if !global_admin.is_configured() {
        tracing::warn!(
            "no global_admin credentials configured; /admin surfaces will refuse every token"
        );
    }
    if config.is_production() && config.cors_origins.is_empty() {
        tracing::warn!("running in production with permissive CORS; set GATEWAY_CORS_ORIGINS");
    }

    let runtime = Arc::new(TenantRuntime::new(Arc::clone(&registry)));
    let metrics = Arc::new(GatewayMetrics::new()?);
    metrics.set_tenants_total(registry.count().await);

    let backups = Arc::new(BackupRepository::open(config.backups_dir()).map_err(ApiError::from)?);

    let event_logger: BackupCallback = Arc::new(|event| {
        tracing::info!(event = ?event, "backup lifecycle event");
    });
    let (backup_service, restore_service) = match &options.backup_pepper {
        Some(pepper) => (
            Some(Arc::new(
                BackupService::new(pepper.clone(), Arc::clone(&backups))
                    .with_callback(Arc::clone(&event_logger)),
            )),
            Some(Arc::new(
                RestoreService::new(Some(pepper.clone()), Arc::clone(&backups))
                    .with_callback(Arc::clone(&event_logger)),
            )),
        ),
        None => {
            tracing::warn!("LIBERVIA_BACKUP_PEPPER not set; backup/restore disabled");
            (None, None)
        }
    };

    let dr = Arc::new(DrService::new().with_callback(event_logger));
    let rate_limiter = Arc::new(RateLimiterState::new(config.rate_limit_window));

    Ok(AppState {
        config,
        registry,
        runtime,
        global_admin,
        metrics,
        backups,
        backup_service,
        restore_service,
        dr,
        rate_limiter,
    })
}
