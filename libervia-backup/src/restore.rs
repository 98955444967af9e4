//! Append-only restore.
//!
//! Restores verify snapshot integrity first, check the snapshot's own event
//! chain for continuity, and then walk entity items through a pluggable
//! target: absent items are appended (in effective mode), present items are
//! counted, and failures become conflicts. **An existing item is never
//! overwritten.** Running the same restore twice is therefore a no-op the
//! second time.

use chrono::Utc;
use libervia_core::{
    BackupEntityType, BackupEvent, BackupId, EventRecord, RestoreEntityOutcome, RestoreError,
    RestoreReport, TenantId,
};
use libervia_kernel::verify_chain;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::crypto::{verify_snapshot, BackupPepper};
use crate::repository::BackupRepository;
use crate::service::BackupCallback;

/// Target of a restore: existence checks plus append-only writes.
#[async_trait::async_trait]
pub trait RestoreTarget: Send + Sync {
    /// Whether `item` already exists for `entity_type`.
    async fn exists(
        &self,
        entity_type: BackupEntityType,
        item: &serde_json::Value,
    ) -> Result<bool, RestoreError>;

    /// Append a missing item. Must not overwrite anything.
    async fn append(
        &self,
        entity_type: BackupEntityType,
        item: &serde_json::Value,
    ) -> Result<(), RestoreError>;
}

/// Options for one restore run.
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub backup_id: BackupId,
    /// Dry runs report intended changes without touching the target
    pub dry_run: bool,
    /// Restrict to these entity types; `None` restores everything included
    pub include_entities: Option<Vec<BackupEntityType>>,
    /// When set, the snapshot must belong to this tenant
    pub tenant_id: Option<TenantId>,
    /// Event-chain continuity check; on unless explicitly disabled
    pub verify_eventlog_continuity: bool,
}

impl RestoreOptions {
    pub fn new(backup_id: BackupId) -> Self {
        Self {
            backup_id,
            dry_run: true,
            include_entities: None,
            tenant_id: None,
            verify_eventlog_continuity: true,
        }
    }
}

/// Verifies and applies snapshots.
pub struct RestoreService {
    pepper: Option<BackupPepper>,
    repository: Arc<BackupRepository>,
    callback: Option<BackupCallback>,
}

impl RestoreService {
    pub fn new(pepper: Option<BackupPepper>, repository: Arc<BackupRepository>) -> Self {
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

    /// Run a restore per `options` against `target`.
    pub async fn restore(
        &self,
        options: &RestoreOptions,
        target: &dyn RestoreTarget,
    ) -> Result<RestoreReport, RestoreError> {
        let snapshot = self
            .repository
            .load(&options.backup_id)
            .map_err(|e| RestoreError::Rejected {
                errors: vec![e.to_string()],
            })?;

        // Integrity gate: nothing is touched unless the snapshot verifies.
        let integrity = verify_snapshot(self.pepper.as_ref(), &snapshot);
        if !integrity.valid {
            self.emit(&BackupEvent::RestoreRejected {
                backup_id: options.backup_id.clone(),
                errors: integrity.errors.clone(),
            });
            return Err(RestoreError::Rejected {
                errors: integrity.errors,
            });
        }

        if let Some(expected) = &options.tenant_id {
            if &snapshot.metadata.tenant_id != expected {
                let errors = vec![format!(
                    "snapshot belongs to tenant {} (expected {})",
                    snapshot.metadata.tenant_id, expected
                )];
                self.emit(&BackupEvent::RestoreRejected {
                    backup_id: options.backup_id.clone(),
                    errors: errors.clone(),
                });
                return Err(RestoreError::Rejected { errors });
            }
        }

        let entities: Vec<_> = snapshot
            .entities
            .iter()
            .filter(|e| {
                options
                    .include_entities
                    .as_ref()
                    .map(|included| included.contains(&e.entity_type))
                    .unwrap_or(true)
            })
            .collect();

        // Continuity gate: the snapshot's own events must form a valid chain.
        if options.verify_eventlog_continuity {
            if let Some(event_section) = entities
                .iter()
                .find(|e| e.entity_type == BackupEntityType::EventLog)
            {
                let records: Vec<EventRecord> = event_section
                    .data
                    .iter()
                    .map(|v| serde_json::from_value(v.clone()))
                    .collect::<Result<_, _>>()
                    .map_err(|e| RestoreError::ContinuityBroken {
                        reason: format!("event entry does not parse: {}", e),
                    })?;
                let verification = verify_chain(&records);
                if !verification.valid {
                    let reason = verification
                        .reason
                        .unwrap_or_else(|| "chain verification failed".to_string());
                    self.emit(&BackupEvent::RestoreRejected {
                        backup_id: options.backup_id.clone(),
                        errors: vec![reason.clone()],
                    });
                    return Err(RestoreError::ContinuityBroken { reason });
                }
            }
        }

        let mut outcomes: BTreeMap<String, RestoreEntityOutcome> = BTreeMap::new();
        for entity in entities {
            let outcome = outcomes.entry(entity.entity_type.to_string()).or_default();
            for item in &entity.data {
                match target.exists(entity.entity_type, item).await {
                    Ok(true) => outcome.already_exists += 1,
                    Ok(false) => {
                        if options.dry_run {
                            outcome.appended += 1;
                            continue;
                        }
                        match target.append(entity.entity_type, item).await {
                            Ok(()) => outcome.appended += 1,
                            Err(e) => {
                                outcome.conflicts += 1;
                                outcome.errors.push(e.to_string());
                            }
                        }
                    }
                    Err(e) => {
                        outcome.conflicts += 1;
                        outcome.errors.push(e.to_string());
                    }
                }
            }
        }

        let event = if options.dry_run {
            BackupEvent::RestoreDryRun {
                backup_id: options.backup_id.clone(),
            }
        } else {
            BackupEvent::RestoreExecuted {
                backup_id: options.backup_id.clone(),
            }
        };
        self.emit(&event);

        Ok(RestoreReport {
            backup_id: options.backup_id.clone(),
            dry_run: options.dry_run,
            outcomes,
            completed_at: Utc::now(),
        })
    }

    fn emit(&self, event: &BackupEvent) {
        if let Some(callback) = &self.callback {
            callback(event);
        }
    }
}
