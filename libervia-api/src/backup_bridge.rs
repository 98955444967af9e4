//! Bridges between the backup engine and the live core.
//!
//! The backup crate speaks in pluggable traits; these adapters implement
//! them over a tenant's `CoreInstance` and the registry.

use libervia_backup::{EntityDataProvider, RestoreTarget};
use libervia_core::{BackupEntityType, BackupError, RestoreError, TenantId};
use libervia_kernel::CoreInstance;
use libervia_tenancy::TenantRegistry;
use std::sync::Arc;

fn storage_err(e: libervia_core::StorageError) -> BackupError {
    BackupError::PersistFailed {
        reason: e.to_string(),
    }
}

fn to_values<T: serde::Serialize>(items: Vec<T>) -> Result<Vec<serde_json::Value>, BackupError> {
    items
        .into_iter()
        .map(|item| {
            serde_json::to_value(item).map_err(|e| BackupError::FormatInvalid {
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Feeds snapshot creation from a live instance plus the tenant's registry
/// record.
pub struct KernelDataProvider {
    pub instance: Arc<CoreInstance>,
    pub registry: Arc<TenantRegistry>,
    pub tenant_id: TenantId,
}

#[async_trait::async_trait]
impl EntityDataProvider for KernelDataProvider {
    async fn fetch(
        &self,
        entity_type: BackupEntityType,
    ) -> Result<Vec<serde_json::Value>, BackupError> {
        match entity_type {
            BackupEntityType::EventLog => {
                to_values(self.instance.all_events().map_err(storage_err)?)
            }
            BackupEntityType::ObservacoesDeConsequencia => {
                to_values(self.instance.all_observacoes().map_err(storage_err)?)
            }
            BackupEntityType::AutonomyMandates => {
                to_values(self.instance.all_mandates().map_err(storage_err)?)
            }
            BackupEntityType::ReviewCases => {
                to_values(self.instance.all_review_cases().map_err(storage_err)?)
            }
            BackupEntityType::TenantRegistry => {
                let tenant = self.registry.get(&self.tenant_id).await;
                to_values(tenant.into_iter().collect::<Vec<_>>())
            }
        }
    }
}

/// Applies restored items onto a live instance, append-only.
pub struct KernelRestoreTarget {
    pub instance: Arc<CoreInstance>,
}

fn item_id(item: &serde_json::Value) -> Result<&str, RestoreError> {
    item.get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RestoreError::Conflict {
            entity: "item".to_string(),
            reason: "item carries no id".to_string(),
        })
}

fn restore_err(entity: BackupEntityType) -> impl Fn(libervia_core::StorageError) -> RestoreError {
    move |e| RestoreError::Conflict {
        entity: entity.to_string(),
        reason: e.to_string(),
    }
}

fn parse_item<T: serde::de::DeserializeOwned>(
    entity: BackupEntityType,
    item: &serde_json::Value,
) -> Result<T, RestoreError> {
    serde_json::from_value(item.clone()).map_err(|e| RestoreError::Conflict {
        entity: entity.to_string(),
        reason: format!("item does not parse: {}", e),
    })
}

#[async_trait::async_trait]
impl RestoreTarget for KernelRestoreTarget {
    async fn exists(
        &self,
        entity_type: BackupEntityType,
        item: &serde_json::Value,
    ) -> Result<bool, RestoreError> {
        match entity_type {
            BackupEntityType::EventLog => {
                let id = item_id(item)?;
                self.instance.has_event(id).map_err(restore_err(entity_type))
            }
            BackupEntityType::ObservacoesDeConsequencia => {
                let id = item_id(item)?;
                self.instance
                    .has_observacao(id)
                    .map_err(restore_err(entity_type))
            }
            BackupEntityType::AutonomyMandates => {
                let id = item_id(item)?;
                self.instance
                    .has_mandate(id)
                    .map_err(restore_err(entity_type))
            }
            BackupEntityType::ReviewCases => {
                let id = item_id(item)?;
                self.instance
                    .has_review_case(id)
                    .map_err(restore_err(entity_type))
            }
            // Registry records restore through the admin surface, not here
            BackupEntityType::TenantRegistry => Ok(true),
        }
    }

    async fn append(
        &self,
        entity_type: BackupEntityType,
        item: &serde_json::Value,
    ) -> Result<(), RestoreError> {
        match entity_type {
            BackupEntityType::EventLog => self
                .instance
                .append_event(parse_item(entity_type, item)?)
                .map_err(restore_err(entity_type)),
            BackupEntityType::ObservacoesDeConsequencia => self
                .instance
                .append_observacao(parse_item(entity_type, item)?)
                .map_err(restore_err(entity_type)),
            BackupEntityType::AutonomyMandates => self
                .instance
                .append_mandate(parse_item(entity_type, item)?)
                .map_err(restore_err(entity_type)),
            BackupEntityType::ReviewCases => self
                .instance
                .append_review_case(parse_item(entity_type, item)?)
                .map_err(restore_err(entity_type)),
            BackupEntityType::TenantRegistry => Ok(()),
        }
    }
}
