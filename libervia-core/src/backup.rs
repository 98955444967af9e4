//! Backup snapshot format and disaster-recovery procedure types.
//!
//! The snapshot shape mirrors `backup_<tenant>_<stamp>.json` on disk. Hashing
//! and signing semantics live in `libervia-backup`; this module only defines
//! the data.

use crate::{BackupId, TenantId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// SNAPSHOT FORMAT
// ============================================================================

/// Entity classes a snapshot may contain. Serialized variant names are part
/// of the backup format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BackupEntityType {
    EventLog,
    ObservacoesDeConsequencia,
    AutonomyMandates,
    ReviewCases,
    TenantRegistry,
}

impl BackupEntityType {
    /// All entity types, in canonical order.
    pub const ALL: [BackupEntityType; 5] = [
        BackupEntityType::EventLog,
        BackupEntityType::ObservacoesDeConsequencia,
        BackupEntityType::AutonomyMandates,
        BackupEntityType::ReviewCases,
        BackupEntityType::TenantRegistry,
    ];
}

impl fmt::Display for BackupEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Display matches the serde variant name used on the wire
        write!(f, "{:?}", self)
    }
}

impl FromStr for BackupEntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "EventLog" => Ok(BackupEntityType::EventLog),
            "ObservacoesDeConsequencia" => Ok(BackupEntityType::ObservacoesDeConsequencia),
            "AutonomyMandates" => Ok(BackupEntityType::AutonomyMandates),
            "ReviewCases" => Ok(BackupEntityType::ReviewCases),
            "TenantRegistry" => Ok(BackupEntityType::TenantRegistry),
            _ => Err(format!("Invalid BackupEntityType: {}", s)),
        }
    }
}

/// One entity section of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntity {
    pub entity_type: BackupEntityType,
    pub data: Vec<serde_json::Value>,
    /// SHA-256 (64-hex) over the canonical serialization of `data`
    pub data_hash: String,
}

/// Snapshot metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub backup_id: BackupId,
    pub created_at: Timestamp,
    pub tenant_id: TenantId,
    /// `<major>.<minor>.<patch>`; loaders accept only a matching major
    pub format_version: String,
    pub included_entities: Vec<BackupEntityType>,
    pub entity_counts: BTreeMap<String, u64>,
    /// `current_hash` of the last event when EventLog is included
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<String>,
}

/// A complete on-disk snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub metadata: BackupMetadata,
    pub entities: Vec<BackupEntity>,
    /// SHA-256 over the canonical serialization of metadata + entity digests
    pub content_hash: String,
    /// HMAC-SHA256(content_hash) under the backup pepper
    pub signature: String,
}

/// Multi-error result of snapshot integrity verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

// ============================================================================
// RESTORE REPORTING
// ============================================================================

/// Per-entity outcome counts of a restore pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreEntityOutcome {
    pub appended: u64,
    pub already_exists: u64,
    pub conflicts: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Full report of a restore run (dry or effective).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub backup_id: BackupId,
    pub dry_run: bool,
    pub outcomes: BTreeMap<String, RestoreEntityOutcome>,
    pub completed_at: Timestamp,
}

// ============================================================================
// DISASTER RECOVERY PROCEDURES
// ============================================================================

/// The four staged DR procedure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrProcedureType {
    TotalNodeLoss,
    CorruptionDetection,
    OldSnapshotRestore,
    ControlledRollback,
}

/// State of one DR step (and of the procedure as a whole).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrStepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    RolledBack,
}

/// One ordered step of a DR procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrStep {
    pub name: String,
    pub status: DrStepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A staged DR procedure with operator confirmation between preparation and
/// the effective restore phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrProcedure {
    pub procedure_id: String,
    #[serde(rename = "type")]
    pub procedure_type: DrProcedureType,
    pub status: DrStepStatus,
    pub steps: Vec<DrStep>,
    pub started_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<BackupId>,
    #[serde(default)]
    pub notes: Vec<String>,
    /// True once preparation is done and the procedure awaits confirmation
    #[serde(default)]
    pub awaiting_confirmation: bool,
}

/// Events emitted by backup/restore/DR flows to the optional callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupEvent {
    BackupCreated {
        backup_id: BackupId,
        tenant_id: TenantId,
    },
    RestoreRejected {
        backup_id: BackupId,
        errors: Vec<String>,
    },
    RestoreDryRun {
        backup_id: BackupId,
    },
    RestoreExecuted {
        backup_id: BackupId,
    },
    DrProgress {
        procedure_id: String,
        step: String,
        status: DrStepStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_wire_names() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&BackupEntityType::ObservacoesDeConsequencia)?;
        assert_eq!(json, "\"ObservacoesDeConsequencia\"");
        let back: BackupEntityType = serde_json::from_str(&json)?;
        assert_eq!(back, BackupEntityType::ObservacoesDeConsequencia);
        Ok(())
    }

    #[test]
    fn test_entity_type_parse_rejects_unknown() {
        assert!("Observacoes".parse::<BackupEntityType>().is_err());
    }

    #[test]
    fn test_dr_procedure_type_tag() -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(&DrProcedureType::TotalNodeLoss)?;
        assert_eq!(json, "\"total_node_loss\"");
        Ok(())
    }

    #[test]
    fn test_backup_event_tagging() -> Result<(), serde_json::Error> {
        let event = BackupEvent::RestoreRejected {
            backup_id: BackupId::new("backup_a_1"),
            errors: vec!["contentHash mismatch".to_string()],
        };
        let json = serde_json::to_string(&event)?;
        assert!(json.contains("\"event\":\"RESTORE_REJECTED\""));
        Ok(())
    }
}
