//! Cache of live per-tenant core instances.
//!
//! At most one `CoreInstance` exists per tenant. Creation is serialized per
//! id with a double-checked lock, so concurrent first requests for the same
//! tenant observe the same instance. Suspending or shutting down one tenant
//! never touches the others.

use dashmap::DashMap;
use futures_util::future::join_all;
use libervia_core::{LiberviaResult, RuntimeError, TenantError, TenantId, TenantStatus};
use libervia_kernel::{AdapterFactory, CoreInstance, InstanceMetrics, IntegrationAdapter};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::registry::TenantRegistry;

/// Runtime cache keyed by tenant id.
pub struct TenantRuntime {
    registry: Arc<TenantRegistry>,
    instances: DashMap<TenantId, Arc<CoreInstance>>,
    adapters: DashMap<TenantId, Arc<dyn IntegrationAdapter>>,
    creation_locks: DashMap<TenantId, Arc<Mutex<()>>>,
    adapter_factory: Option<AdapterFactory>,
}

impl TenantRuntime {
    pub fn new(registry: Arc<TenantRegistry>) -> Self {
        Self {
            registry,
            instances: DashMap::new(),
            adapters: DashMap::new(),
            creation_locks: DashMap::new(),
            adapter_factory: None,
        }
    }

    /// Attach an integration-adapter factory. Must be called before the
    /// first `get_or_create`.
    pub fn with_adapter_factory(mut self, factory: AdapterFactory) -> Self {
        self.adapter_factory = Some(factory);
        self
    }

    /// Return the cached instance for `id`, creating it if needed.
    ///
    /// Suspended and deleted tenants are refused with distinct errors; an
    /// unknown tenant is "not found". Cached hits update `last_activity`.
    pub async fn get_or_create(&self, id: &TenantId) -> LiberviaResult<Arc<CoreInstance>> {
        if let Some(instance) = self.instances.get(id) {
            instance.touch();
            return Ok(Arc::clone(&instance));
        }

        // Per-id creation lock: losers of the race find the winner's
        // instance on the second check.
        let lock = self
            .creation_locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(instance) = self.instances.get(id) {
            instance.touch();
            return Ok(Arc::clone(&instance));
        }

        let tenant = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| TenantError::NotFound { id: id.clone() })?;
        match tenant.status {
            TenantStatus::Active => {}
            TenantStatus::Suspended => {
                return Err(TenantError::Suspended { id: id.clone() }.into())
            }
            TenantStatus::Deleted => return Err(TenantError::Deleted { id: id.clone() }.into()),
        }

        let data_dir = self.registry.data_dir(id)?;
        std::fs::create_dir_all(&data_dir).map_err(|e| RuntimeError::InstanceOpenFailed {
            tenant_id: id.clone(),
            reason: e.to_string(),
        })?;
        let instance = Arc::new(CoreInstance::open(id.clone(), &data_dir).map_err(|e| {
            RuntimeError::InstanceOpenFailed {
                tenant_id: id.clone(),
                reason: e.to_string(),
            }
        })?);

        if let Some(factory) = &self.adapter_factory {
            if let Some(adapter) = factory(id, &data_dir, &instance) {
                adapter.init().await?;
                self.adapters.insert(id.clone(), adapter);
            }
        }

        self.instances.insert(id.clone(), Arc::clone(&instance));
        tracing::info!(tenant_id = %id, "Core instance started");
        Ok(instance)
    }

    /// Cached instance, if any. Never creates.
    pub fn get(&self, id: &TenantId) -> Option<Arc<CoreInstance>> {
        self.instances.get(id).map(|i| Arc::clone(&i))
    }

    pub fn is_active(&self, id: &TenantId) -> bool {
        self.instances.contains_key(id)
    }

    pub fn list_active(&self) -> Vec<TenantId> {
        self.instances.iter().map(|e| e.key().clone()).collect()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Shut one tenant down: adapter hook first, then cache eviction.
    /// A tenant without a live instance is a no-op.
    pub async fn shutdown(&self, id: &TenantId) {
        if let Some((_, adapter)) = self.adapters.remove(id) {
            if let Err(e) = adapter.shutdown().await {
                tracing::warn!(tenant_id = %id, error = %e, "adapter shutdown failed");
            }
        }
        if self.instances.remove(id).is_some() {
            tracing::info!(tenant_id = %id, "Core instance shut down");
        }
        self.creation_locks.remove(id);
    }

    /// Shut all live instances down in parallel.
    pub async fn shutdown_all(&self) {
        let ids = self.list_active();
        join_all(ids.iter().map(|id| self.shutdown(id))).await;
    }

    pub fn metrics(&self, id: &TenantId) -> Option<InstanceMetrics> {
        self.get(id).and_then(|i| i.metrics().ok())
    }

    pub fn all_metrics(&self) -> Vec<InstanceMetrics> {
        self.instances
            .iter()
            .filter_map(|e| e.value().metrics().ok())
            .collect()
    }

    pub fn is_healthy(&self, id: &TenantId) -> bool {
        self.get(id).map(|i| i.is_healthy()).unwrap_or(false)
    }
}
