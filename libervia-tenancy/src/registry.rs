//! Durable tenant catalog with RBAC keys.
//!
//! The catalog lives at `<baseDir>/config/tenants.json` and is rewritten
//! atomically (`.tmp` then rename) on every mutation. A single async mutex
//! serializes all persists, so fire-and-forget writes (the `last_used_at`
//! touch) can never interleave with awaited ones.
//!
//! `last_used_at` updates flow through a bounded queue drained by one
//! background task: requests never wait on that persist, shutdown drains the
//! queue, and bursts degrade by dropping updates rather than stalling disk.

use chrono::Utc;
use libervia_core::{
    AuthKey, AuthKeySummary, CreatedKey, KeyId, KeyRole, KeyStatus, LiberviaError, LiberviaResult,
    RegistryError, Tenant, TenantCatalog, TenantError, TenantFeatures, TenantId, TenantQuotas,
    TenantStatus,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::security::{
    generate_key_id, generate_token, hmac_token, resolve_tenant_data_dir, secure_compare,
    validate_tenant_id, validate_token, AuthPepper,
};

/// Catalog schema version this build reads and writes.
const CATALOG_VERSION: u32 = 1;

/// Capacity of the `last_used_at` update queue.
const LAST_USED_QUEUE: usize = 1024;

/// Role/tenant pair resolved from a presented token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantAuthContext {
    pub tenant_id: TenantId,
    pub role: KeyRole,
    pub key_id: KeyId,
}

/// Input for registering a tenant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTenant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub quotas: Option<TenantQuotas>,
    #[serde(default)]
    pub features: Option<TenantFeatures>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
    /// When set, an opaque legacy `apiToken` is minted alongside the record
    #[serde(default)]
    pub with_legacy_token: bool,
}

/// Partial update for an existing tenant.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTenant {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub quotas: Option<TenantQuotas>,
    #[serde(default)]
    pub features: Option<TenantFeatures>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

struct LastUsedUpdate {
    tenant_id: TenantId,
    key_id: KeyId,
    at: libervia_core::Timestamp,
}

/// The durable tenant catalog.
pub struct TenantRegistry {
    base_dir: PathBuf,
    pepper: AuthPepper,
    tenants: RwLock<BTreeMap<TenantId, Tenant>>,
    /// Serializes every catalog write; see module docs.
    persist_lock: Mutex<()>,
    last_used_tx: std::sync::Mutex<Option<mpsc::Sender<LastUsedUpdate>>>,
    writer: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TenantRegistry {
    /// Load (or initialize) the catalog under `base_dir`.
    ///
    /// A malformed catalog file is fatal: refusing to boot beats silently
    /// dropping tenants.
    pub fn open(base_dir: impl Into<PathBuf>, pepper: AuthPepper) -> LiberviaResult<Arc<Self>> {
        let base_dir = base_dir.into();
        let path = catalog_path(&base_dir);

        let tenants = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| RegistryError::ReadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            let catalog: TenantCatalog =
                serde_json::from_str(&raw).map_err(|e| RegistryError::Malformed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            if catalog.version != CATALOG_VERSION {
                return Err(RegistryError::UnsupportedVersion {
                    version: catalog.version,
                }
                .into());
            }
            catalog
                .tenants
                .into_iter()
                .map(|t| (t.id.clone(), t))
                .collect()
        } else {
            BTreeMap::new()
        };

        Ok(Arc::new(Self {
            base_dir,
            pepper,
            tenants: RwLock::new(tenants),
            persist_lock: Mutex::new(()),
            last_used_tx: std::sync::Mutex::new(None),
            writer: std::sync::Mutex::new(None),
        }))
    }

    /// Start the background `last_used_at` writer. Idempotent.
    pub fn spawn_last_used_writer(self: &Arc<Self>) {
        let mut tx_slot = match self.last_used_tx.lock() {
            Ok(slot) => slot,
            Err(_) => return,
        };
        if tx_slot.is_some() {
            return;
        }
        let (tx, mut rx) = mpsc::channel::<LastUsedUpdate>(LAST_USED_QUEUE);
        *tx_slot = Some(tx);
        drop(tx_slot);

        let registry = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                registry.apply_last_used(update).await;
            }
        });
        if let Ok(mut writer) = self.writer.lock() {
            *writer = Some(handle);
        }
    }

    /// Drop the writer queue and wait for it to drain.
    pub async fn shutdown(&self) {
        if let Ok(mut tx_slot) = self.last_used_tx.lock() {
            tx_slot.take();
        }
        let handle = self.writer.lock().ok().and_then(|mut w| w.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "last_used_at writer ended abnormally");
            }
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    // ========================================================================
    // Tenant lifecycle
    // ========================================================================

    /// Register a tenant: validates the id, creates the data directory, and
    /// persists the record.
    pub async fn register(&self, input: RegisterTenant) -> LiberviaResult<Tenant> {
        let id = validate_tenant_id(&input.id)?;

        {
            let tenants = self.tenants.read().await;
            if tenants.contains_key(&id) {
                return Err(TenantError::AlreadyExists { id }.into());
            }
        }

        let data_dir = resolve_tenant_data_dir(&self.base_dir, id.as_str(), true)?;
        fs::create_dir_all(&data_dir).map_err(|e| RegistryError::PersistFailed {
            reason: format!("failed to create {}: {}", data_dir.display(), e),
        })?;

        let now = Utc::now();
        let tenant = Tenant {
            id: id.clone(),
            name: input.name,
            status: TenantStatus::Active,
            created_at: now,
            updated_at: now,
            quotas: input.quotas.unwrap_or_default(),
            features: input.features.unwrap_or_default(),
            metadata: input.metadata.unwrap_or_default(),
            api_token: input.with_legacy_token.then(generate_token),
            keys: Vec::new(),
        };

        self.tenants.write().await.insert(id, tenant.clone());
        self.persist().await?;
        tracing::info!(tenant_id = %tenant.id, "Tenant registered");
        Ok(tenant)
    }

    pub async fn get(&self, id: &TenantId) -> Option<Tenant> {
        self.tenants.read().await.get(id).cloned()
    }

    /// List tenants; soft-deleted ones only when asked for.
    pub async fn list(&self, include_deleted: bool) -> Vec<Tenant> {
        self.tenants
            .read()
            .await
            .values()
            .filter(|t| include_deleted || t.status != TenantStatus::Deleted)
            .cloned()
            .collect()
    }

    pub async fn list_active(&self) -> Vec<Tenant> {
        self.tenants
            .read()
            .await
            .values()
            .filter(|t| t.status == TenantStatus::Active)
            .cloned()
            .collect()
    }

    pub async fn exists(&self, id: &TenantId) -> bool {
        self.tenants.read().await.contains_key(id)
    }

    pub async fn is_active(&self, id: &TenantId) -> bool {
        self.tenants
            .read()
            .await
            .get(id)
            .map(|t| t.status == TenantStatus::Active)
            .unwrap_or(false)
    }

    /// Count of non-deleted tenants, for the `tenants_total` gauge.
    pub async fn count(&self) -> usize {
        self.tenants
            .read()
            .await
            .values()
            .filter(|t| t.status != TenantStatus::Deleted)
            .count()
    }

    /// Resolve a tenant's data directory (paranoid containment checks on).
    pub fn data_dir(&self, id: &TenantId) -> LiberviaResult<PathBuf> {
        Ok(resolve_tenant_data_dir(&self.base_dir, id.as_str(), true)?)
    }

    /// Merge a partial update into a tenant record.
    pub async fn update(&self, id: &TenantId, patch: UpdateTenant) -> LiberviaResult<Tenant> {
        let updated = {
            let mut tenants = self.tenants.write().await;
            let tenant = tenants
                .get_mut(id)
                .ok_or_else(|| TenantError::NotFound { id: id.clone() })?;
            if let Some(name) = patch.name {
                tenant.name = name;
            }
            if let Some(quotas) = patch.quotas {
                tenant.quotas = quotas;
            }
            if let Some(features) = patch.features {
                tenant.features = features;
            }
            if let Some(metadata) = patch.metadata {
                tenant.metadata.extend(metadata);
            }
            tenant.updated_at = Utc::now();
            tenant.clone()
        };
        self.persist().await?;
        Ok(updated)
    }

    /// active -> suspended. Any other source status is rejected.
    pub async fn suspend(&self, id: &TenantId) -> LiberviaResult<Tenant> {
        self.transition(id, TenantStatus::Active, TenantStatus::Suspended)
            .await
    }

    /// suspended -> active. Any other source status is rejected.
    pub async fn resume(&self, id: &TenantId) -> LiberviaResult<Tenant> {
        self.transition(id, TenantStatus::Suspended, TenantStatus::Active)
            .await
    }

    /// Soft-delete. Data on disk is retained for audit.
    pub async fn remove(&self, id: &TenantId) -> LiberviaResult<Tenant> {
        let updated = {
            let mut tenants = self.tenants.write().await;
            let tenant = tenants
                .get_mut(id)
                .ok_or_else(|| TenantError::NotFound { id: id.clone() })?;
            if tenant.status == TenantStatus::Deleted {
                return Err(TenantError::InvalidTransition {
                    id: id.clone(),
                    from: TenantStatus::Deleted,
                    to: TenantStatus::Deleted,
                }
                .into());
            }
            tenant.status = TenantStatus::Deleted;
            tenant.updated_at = Utc::now();
            tenant.clone()
        };
        self.persist().await?;
        tracing::info!(tenant_id = %id, "Tenant soft-deleted; data retained");
        Ok(updated)
    }

    async fn transition(
        &self,
        id: &TenantId,
        from: TenantStatus,
        to: TenantStatus,
    ) -> LiberviaResult<Tenant> {
        let updated = {
            let mut tenants = self.tenants.write().await;
            let tenant = tenants
                .get_mut(id)
                .ok_or_else(|| TenantError::NotFound { id: id.clone() })?;
            if tenant.status != from {
                return Err(TenantError::InvalidTransition {
                    id: id.clone(),
                    from: tenant.status,
                    to,
                }
                .into());
            }
            tenant.status = to;
            tenant.updated_at = Utc::now();
            tenant.clone()
        };
        self.persist().await?;
        Ok(updated)
    }

    // ========================================================================
    // RBAC keys
    // ========================================================================

    /// Mint a key for a tenant. Only `public` and `tenant_admin` roles exist
    /// at tenant scope; the plaintext token is returned exactly once.
    pub async fn create_tenant_key(
        &self,
        id: &TenantId,
        role: KeyRole,
        description: Option<String>,
    ) -> LiberviaResult<CreatedKey> {
        let token = generate_token();
        let token_hash = hmac_token(&self.pepper, &token);
        let now = Utc::now();
        let key_id = generate_key_id();

        {
            let mut tenants = self.tenants.write().await;
            let tenant = tenants
                .get_mut(id)
                .ok_or_else(|| TenantError::NotFound { id: id.clone() })?;
            tenant.keys.push(AuthKey {
                key_id: key_id.clone(),
                role,
                token_hash,
                status: KeyStatus::Active,
                created_at: now,
                last_used_at: None,
                description,
            });
            tenant.updated_at = now;
        }
        self.persist().await?;
        tracing::info!(tenant_id = %id, key_id = %key_id, role = %role, "Tenant key created");

        Ok(CreatedKey {
            key_id,
            role,
            token,
            created_at: now,
        })
    }

    /// List a tenant's keys with `tokenHash` redacted.
    pub async fn list_tenant_keys(&self, id: &TenantId) -> LiberviaResult<Vec<AuthKeySummary>> {
        let tenants = self.tenants.read().await;
        let tenant = tenants
            .get(id)
            .ok_or_else(|| TenantError::NotFound { id: id.clone() })?;
        Ok(tenant.keys.iter().map(AuthKeySummary::from).collect())
    }

    /// Revoke a key. Revoking twice is an error, not a no-op.
    pub async fn revoke_tenant_key(&self, id: &TenantId, key_id: &KeyId) -> LiberviaResult<()> {
        {
            let mut tenants = self.tenants.write().await;
            let tenant = tenants
                .get_mut(id)
                .ok_or_else(|| TenantError::NotFound { id: id.clone() })?;
            let key = tenant
                .keys
                .iter_mut()
                .find(|k| &k.key_id == key_id)
                .ok_or_else(|| libervia_core::AuthError::KeyNotFound {
                    key_id: key_id.clone(),
                })?;
            if key.status == KeyStatus::Revoked {
                return Err(libervia_core::AuthError::KeyAlreadyRevoked {
                    key_id: key_id.clone(),
                }
                .into());
            }
            key.status = KeyStatus::Revoked;
            tenant.updated_at = Utc::now();
        }
        self.persist().await?;
        tracing::info!(tenant_id = %id, key_id = %key_id, "Tenant key revoked");
        Ok(())
    }

    /// Shorthand for minting a fresh key of `role`; old keys are untouched.
    pub async fn rotate_tenant_key(
        &self,
        id: &TenantId,
        role: KeyRole,
    ) -> LiberviaResult<CreatedKey> {
        self.create_tenant_key(id, role, Some("rotated".to_string()))
            .await
    }

    // ========================================================================
    // Token validation
    // ========================================================================

    /// Validate a token against one tenant's keys. On a keyed match the
    /// `last_used_at` touch is queued for the background writer; the legacy
    /// `apiToken` fallback yields role `public` with `keyId = "legacy"`.
    pub async fn validate_tenant_token(
        &self,
        id: &TenantId,
        token: &str,
    ) -> Option<TenantAuthContext> {
        let (matched, legacy_token) = {
            let tenants = self.tenants.read().await;
            let tenant = tenants.get(id)?;
            let matched = tenant
                .active_keys()
                .find(|key| validate_token(&self.pepper, token, &key.token_hash))
                .map(|key| (key.key_id.clone(), key.role));
            (matched, tenant.api_token.clone())
        };

        if let Some((key_id, role)) = matched {
            self.queue_last_used(id.clone(), key_id.clone());
            return Some(TenantAuthContext {
                tenant_id: id.clone(),
                role,
                key_id,
            });
        }

        if let Some(legacy) = legacy_token {
            if secure_compare(token, &legacy) {
                return Some(TenantAuthContext {
                    tenant_id: id.clone(),
                    role: KeyRole::Public,
                    key_id: KeyId::new("legacy"),
                });
            }
        }
        None
    }

    /// Search all tenants for a token match. Used when the tenant is unknown
    /// at auth time (e.g. `/internal` routes).
    pub async fn find_auth_context_by_token(&self, token: &str) -> Option<TenantAuthContext> {
        let ids: Vec<TenantId> = self.tenants.read().await.keys().cloned().collect();
        for id in ids {
            if let Some(ctx) = self.validate_tenant_token(&id, token).await {
                return Some(ctx);
            }
        }
        None
    }

    fn queue_last_used(&self, tenant_id: TenantId, key_id: KeyId) {
        let tx = match self.last_used_tx.lock() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        if let Some(tx) = tx {
            let update = LastUsedUpdate {
                tenant_id,
                key_id,
                at: Utc::now(),
            };
            // Saturated queue: drop the update. last_used_at is
            // observational, requests must never block on it.
            if tx.try_send(update).is_err() {
                tracing::trace!("last_used_at queue full; update dropped");
            }
        }
    }

    async fn apply_last_used(&self, update: LastUsedUpdate) {
        {
            let mut tenants = self.tenants.write().await;
            let Some(tenant) = tenants.get_mut(&update.tenant_id) else {
                return;
            };
            let Some(key) = tenant.keys.iter_mut().find(|k| k.key_id == update.key_id) else {
                return;
            };
            key.last_used_at = Some(update.at);
        }
        // Fire-and-forget path: persistence errors are logged, not raised.
        if let Err(e) = self.persist().await {
            tracing::warn!(error = %e, "failed to persist last_used_at update");
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write the catalog atomically. Callers queue on the persist lock, so
    /// writes land in call order and `.tmp` files never overlap.
    async fn persist(&self) -> LiberviaResult<()> {
        let _guard = self.persist_lock.lock().await;
        let catalog = {
            let tenants = self.tenants.read().await;
            TenantCatalog {
                version: CATALOG_VERSION,
                tenants: tenants.values().cloned().collect(),
                updated_at: Utc::now(),
            }
        };

        let path = catalog_path(&self.base_dir);
        let body =
            serde_json::to_vec_pretty(&catalog).map_err(|e| RegistryError::PersistFailed {
                reason: e.to_string(),
            })?;

        let persist_failed = |e: std::io::Error| {
            LiberviaError::from(RegistryError::PersistFailed {
                reason: e.to_string(),
            })
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(persist_failed)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &body).map_err(persist_failed)?;
        fs::rename(&tmp, &path).map_err(persist_failed)?;
        Ok(())
    }
}

fn catalog_path(base_dir: &Path) -> PathBuf {
    base_dir.join("config").join("tenants.json")
}
