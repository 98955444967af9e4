//! Staged disaster-recovery procedures.
//!
//! Each procedure runs its automated preparation steps, then halts until an
//! operator confirms; only then does the effective phase run. Progress is
//! surfaced through the shared backup callback.

use chrono::Utc;
use libervia_core::{
    BackupEvent, BackupId, DrProcedure, DrProcedureType, DrStep, DrStepStatus, RestoreError,
};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::service::BackupCallback;

/// In-memory registry of DR procedures for this process.
pub struct DrService {
    procedures: RwLock<BTreeMap<String, DrProcedure>>,
    callback: Option<BackupCallback>,
}

impl DrService {
    pub fn new() -> Self {
        Self {
            procedures: RwLock::new(BTreeMap::new()),
            callback: None,
        }
    }

    pub fn with_callback(mut self, callback: BackupCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Start a procedure: runs the preparation steps, then parks it awaiting
    /// operator confirmation before anything irreversible happens.
    pub async fn start(
        &self,
        procedure_type: DrProcedureType,
        backup_id: Option<BackupId>,
    ) -> DrProcedure {
        let procedure_id = format!("dr_{}", Uuid::new_v4().simple());
        let mut steps = steps_for(procedure_type);

        // Preparation phase: every step before the confirmation gate.
        for step in steps.iter_mut() {
            if step.name == CONFIRMATION_STEP {
                step.status = DrStepStatus::InProgress;
                self.emit_progress(&procedure_id, &step.name, step.status);
                break;
            }
            step.status = DrStepStatus::Completed;
            self.emit_progress(&procedure_id, &step.name, step.status);
        }

        let procedure = DrProcedure {
            procedure_id: procedure_id.clone(),
            procedure_type,
            status: DrStepStatus::InProgress,
            steps,
            started_at: Utc::now(),
            completed_at: None,
            backup_id,
            notes: Vec::new(),
            awaiting_confirmation: true,
        };
        self.procedures
            .write()
            .await
            .insert(procedure_id, procedure.clone());
        tracing::info!(
            procedure_id = %procedure.procedure_id,
            procedure_type = ?procedure_type,
            "DR procedure started; awaiting operator confirmation"
        );
        procedure
    }

    /// Operator confirmation: unlocks and runs the effective phase.
    pub async fn confirm(&self, procedure_id: &str) -> Result<DrProcedure, RestoreError> {
        let mut procedures = self.procedures.write().await;
        let procedure =
            procedures
                .get_mut(procedure_id)
                .ok_or_else(|| RestoreError::ProcedureNotFound {
                    procedure_id: procedure_id.to_string(),
                })?;
        if !procedure.awaiting_confirmation {
            return Err(RestoreError::NotAwaitingConfirmation {
                procedure_id: procedure_id.to_string(),
            });
        }

        procedure.awaiting_confirmation = false;
        for step in procedure.steps.iter_mut() {
            if step.status == DrStepStatus::Completed {
                continue;
            }
            step.status = DrStepStatus::Completed;
            self.emit_progress(procedure_id, &step.name, step.status);
        }
        procedure.status = DrStepStatus::Completed;
        procedure.completed_at = Some(Utc::now());
        tracing::info!(procedure_id = %procedure_id, "DR procedure completed");
        Ok(procedure.clone())
    }

    /// Mark a procedure failed with a reason; remaining steps are marked
    /// rolled back.
    pub async fn fail(
        &self,
        procedure_id: &str,
        reason: impl Into<String>,
    ) -> Result<DrProcedure, RestoreError> {
        let mut procedures = self.procedures.write().await;
        let procedure =
            procedures
                .get_mut(procedure_id)
                .ok_or_else(|| RestoreError::ProcedureNotFound {
                    procedure_id: procedure_id.to_string(),
                })?;
        for step in procedure.steps.iter_mut() {
            if step.status != DrStepStatus::Completed {
                step.status = DrStepStatus::RolledBack;
                self.emit_progress(procedure_id, &step.name, step.status);
            }
        }
        procedure.status = DrStepStatus::Failed;
        procedure.awaiting_confirmation = false;
        procedure.completed_at = Some(Utc::now());
        procedure.notes.push(reason.into());
        Ok(procedure.clone())
    }

    pub async fn get(&self, procedure_id: &str) -> Option<DrProcedure> {
        self.procedures.read().await.get(procedure_id).cloned()
    }

    pub async fn list(&self) -> Vec<DrProcedure> {
        self.procedures.read().await.values().cloned().collect()
    }

    pub async fn add_note(
        &self,
        procedure_id: &str,
        note: impl Into<String>,
    ) -> Result<(), RestoreError> {
        let mut procedures = self.procedures.write().await;
        let procedure =
            procedures
                .get_mut(procedure_id)
                .ok_or_else(|| RestoreError::ProcedureNotFound {
                    procedure_id: procedure_id.to_string(),
                })?;
        procedure.notes.push(note.into());
        Ok(())
    }

    fn emit_progress(&self, procedure_id: &str, step: &str, status: DrStepStatus) {
        if let Some(callback) = &self.callback {
            callback(&BackupEvent::DrProgress {
                procedure_id: procedure_id.to_string(),
                step: step.to_string(),
                status,
            });
        }
    }
}

impl Default for DrService {
    fn default() -> Self {
        Self::new()
    }
}

/// The step every procedure halts on until an operator confirms.
const CONFIRMATION_STEP: &str = "await_operator_confirmation";

fn step(name: &str) -> DrStep {
    DrStep {
        name: name.to_string(),
        status: DrStepStatus::Pending,
        detail: None,
    }
}

/// Ordered steps per procedure type. Everything before the confirmation
/// step is automated preparation; everything after is the effective phase.
fn steps_for(procedure_type: DrProcedureType) -> Vec<DrStep> {
    let names: &[&str] = match procedure_type {
        DrProcedureType::TotalNodeLoss => &[
            "validate_environment",
            "locate_latest_snapshot",
            "verify_snapshot_integrity",
            CONFIRMATION_STEP,
            "restore_entities",
            "verify_event_chain",
            "resume_traffic",
        ],
        DrProcedureType::CorruptionDetection => &[
            "quiesce_tenant",
            "run_full_chain_verification",
            "identify_last_good_snapshot",
            CONFIRMATION_STEP,
            "restore_from_snapshot",
            "re_verify_chain",
        ],
        DrProcedureType::OldSnapshotRestore => &[
            "verify_snapshot_integrity",
            "diff_against_live_state",
            CONFIRMATION_STEP,
            "dry_run_restore",
            "effective_restore",
        ],
        DrProcedureType::ControlledRollback => &[
            "snapshot_current_state",
            "verify_rollback_target",
            CONFIRMATION_STEP,
            "apply_rollback",
            "verify_event_chain",
        ],
    };
    names.iter().map(|n| step(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_start_halts_at_confirmation() {
        let service = DrService::new();
        let procedure = service
            .start(DrProcedureType::TotalNodeLoss, None)
            .await;

        assert!(procedure.awaiting_confirmation);
        assert_eq!(procedure.status, DrStepStatus::InProgress);
        let confirmation = procedure
            .steps
            .iter()
            .find(|s| s.name == CONFIRMATION_STEP)
            .map(|s| s.status);
        assert_eq!(confirmation, Some(DrStepStatus::InProgress));
        // Effective steps untouched
        let restore_step = procedure
            .steps
            .iter()
            .find(|s| s.name == "restore_entities")
            .map(|s| s.status);
        assert_eq!(restore_step, Some(DrStepStatus::Pending));
    }

    #[tokio::test]
    async fn test_confirm_completes_remaining_steps() -> Result<(), RestoreError> {
        let service = DrService::new();
        let procedure = service
            .start(DrProcedureType::ControlledRollback, Some(BackupId::new("backup_a_1")))
            .await;

        let confirmed = service.confirm(&procedure.procedure_id).await?;
        assert_eq!(confirmed.status, DrStepStatus::Completed);
        assert!(confirmed.completed_at.is_some());
        assert!(confirmed
            .steps
            .iter()
            .all(|s| s.status == DrStepStatus::Completed));

        // Confirming twice is an error
        assert!(matches!(
            service.confirm(&procedure.procedure_id).await,
            Err(RestoreError::NotAwaitingConfirmation { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_confirm_unknown_procedure() {
        let service = DrService::new();
        assert!(matches!(
            service.confirm("dr_missing").await,
            Err(RestoreError::ProcedureNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_fail_rolls_back_pending_steps() -> Result<(), RestoreError> {
        let service = DrService::new();
        let procedure = service
            .start(DrProcedureType::CorruptionDetection, None)
            .await;

        let failed = service
            .fail(&procedure.procedure_id, "snapshot integrity check failed")
            .await?;
        assert_eq!(failed.status, DrStepStatus::Failed);
        assert!(failed
            .steps
            .iter()
            .any(|s| s.status == DrStepStatus::RolledBack));
        assert_eq!(failed.notes.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_progress_callback_sees_both_phases() -> Result<(), RestoreError> {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let service = DrService::new().with_callback(Arc::new(move |event| {
            if let BackupEvent::DrProgress { step, .. } = event {
                if let Ok(mut seen) = sink.lock() {
                    seen.push(step.clone());
                }
            }
        }));

        let procedure = service
            .start(DrProcedureType::OldSnapshotRestore, None)
            .await;
        service.confirm(&procedure.procedure_id).await?;

        let seen = seen.lock().map_err(|_| RestoreError::Procedure {
            reason: "lock poisoned".to_string(),
        })?;
        assert!(seen.contains(&"verify_snapshot_integrity".to_string()));
        assert!(seen.contains(&"effective_restore".to_string()));
        Ok(())
    }
}
