//! Optional per-tenant integration adapter.
//!
//! The runtime cache can be handed a factory that attaches an adapter to
//! every instance it creates (webhook bridges, sync daemons, ...). The
//! kernel never depends on any concrete adapter.

use libervia_core::{RuntimeError, TenantId};
use std::path::Path;
use std::sync::Arc;

use crate::CoreInstance;

/// Lifecycle hooks an integration can attach to a tenant instance.
#[async_trait::async_trait]
pub trait IntegrationAdapter: Send + Sync {
    /// Called once, after the instance is fully constructed.
    async fn init(&self) -> Result<(), RuntimeError>;

    /// Called when the instance is being shut down.
    async fn shutdown(&self) -> Result<(), RuntimeError>;
}

/// Factory invoked by the runtime for each new instance. Returning `None`
/// means no adapter for that tenant.
pub type AdapterFactory = Arc<
    dyn Fn(&TenantId, &Path, &CoreInstance) -> Option<Arc<dyn IntegrationAdapter>> + Send + Sync,
>;
