//! Snapshot creation.

use chrono::Utc;
use libervia_core::{
    BackupEntity, BackupEntityType, BackupError, BackupEvent, BackupMetadata, BackupSnapshot,
    TenantId,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::canonical::canonical_hash;
use crate::crypto::{compute_content_hash, sign_content_hash, BackupPepper};
use crate::repository::BackupRepository;

/// Pluggable source of entity data, implemented over the live core by the
/// gateway and over fixtures in tests.
#[async_trait::async_trait]
pub trait EntityDataProvider: Send + Sync {
    async fn fetch(
        &self,
        entity_type: BackupEntityType,
    ) -> Result<Vec<serde_json::Value>, BackupError>;
}

/// Observer for backup/restore lifecycle events.
pub type BackupCallback = Arc<dyn Fn(&BackupEvent) + Send + Sync>;

/// Builds, signs and persists snapshots.
pub struct BackupService {
    pepper: BackupPepper,
    repository: Arc<BackupRepository>,
    callback: Option<BackupCallback>,
}

impl BackupService {
    pub fn new(pepper: BackupPepper, repository: Arc<BackupRepository>) -> Self {
        Self {
            pepper,
            repository,
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: BackupCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Create a snapshot of `included` entities for one tenant.
    ///
    /// Data is fetched through the provider, hashed per entity, wrapped in
    /// metadata (with the event-chain tail recorded when EventLog is
    /// included), content-hashed, signed, and persisted atomically.
    pub async fn create_backup(
        &self,
        tenant_id: &TenantId,
        included: &[BackupEntityType],
        provider: &dyn EntityDataProvider,
    ) -> Result<BackupSnapshot, BackupError> {
        let created_at = Utc::now();
        let backup_id = BackupRepository::backup_id_for(tenant_id, created_at);

        let mut entities = Vec::with_capacity(included.len());
        let mut entity_counts = BTreeMap::new();
        let mut last_event_id = None;
        let mut last_event_hash = None;

        for entity_type in included {
            let data = provider.fetch(*entity_type).await?;
            entity_counts.insert(entity_type.to_string(), data.len() as u64);

            if *entity_type == BackupEntityType::EventLog {
                if let Some(last) = data.last() {
                    last_event_id = last
                        .get("id")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string());
                    last_event_hash = last
                        .get("current_hash")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string());
                }
            }

            let data_hash = canonical_hash(&data)?;
            entities.push(BackupEntity {
                entity_type: *entity_type,
                data,
                data_hash,
            });
        }

        let metadata = BackupMetadata {
            backup_id: backup_id.clone(),
            created_at,
            tenant_id: tenant_id.clone(),
            format_version: crate::FORMAT_VERSION.to_string(),
            included_entities: included.to_vec(),
            entity_counts,
            last_event_hash,
            last_event_id,
        };

        let content_hash = compute_content_hash(&metadata, &entities)?;
        let signature = sign_content_hash(&self.pepper, &content_hash)?;
        let snapshot = BackupSnapshot {
            metadata,
            entities,
            content_hash,
            signature,
        };

        self.repository.save(&snapshot).await?;
        tracing::info!(tenant_id = %tenant_id, backup_id = %backup_id, "Backup created");
        if let Some(callback) = &self.callback {
            callback(&BackupEvent::BackupCreated {
                backup_id,
                tenant_id: tenant_id.clone(),
            });
        }
        Ok(snapshot)
    }
}
