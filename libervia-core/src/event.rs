//! Event log record types.
//!
//! Entries are produced by the per-tenant core and consumed here for audit
//! and backup continuity checks; the gateway never mutates them. Field names
//! match the core's on-disk format exactly (no casing translation).

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// One entry of a tenant's cryptographically chained event log.
///
/// Chain invariant: `entry[i].previous_hash == entry[i-1].current_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub timestamp: Timestamp,
    /// Event name, e.g. `decisao_registrada`
    pub evento: String,
    /// Entity kind the event refers to, e.g. `decisao`, `episodio`
    pub entidade: String,
    pub entidade_id: String,
    pub actor: String,
    /// `current_hash` of the preceding entry; genesis entries use all zeros
    pub previous_hash: String,
    pub current_hash: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Hash value used for the genesis entry's `previous_hash`.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Summary of an event log's state, served by `/api/v1/eventlog/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogStatus {
    pub total_events: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_hash: Option<String>,
    pub segments: u32,
}

/// Result of walking a chain: either intact or broken at a known entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub valid: bool,
    pub checked_events: u64,
    /// Id of the first entry whose linkage or hash failed, when invalid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ChainVerification {
    /// An intact chain of `checked_events` entries.
    pub fn intact(checked_events: u64) -> Self {
        Self {
            valid: true,
            checked_events,
            broken_at: None,
            reason: None,
        }
    }

    /// A chain broken at `entry_id`.
    pub fn broken(
        checked_events: u64,
        entry_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            valid: false,
            checked_events,
            broken_at: Some(entry_id.into()),
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_event_record_field_names() -> Result<(), serde_json::Error> {
        let record = EventRecord {
            id: "evt_1".to_string(),
            timestamp: Utc::now(),
            evento: "decisao_registrada".to_string(),
            entidade: "decisao".to_string(),
            entidade_id: "dec_1".to_string(),
            actor: "gateway".to_string(),
            previous_hash: GENESIS_HASH.to_string(),
            current_hash: "ff".repeat(32),
            payload: serde_json::json!({"nivel": 1}),
        };
        let json = serde_json::to_string(&record)?;
        // Wire format keeps the core's field names verbatim
        assert!(json.contains("\"evento\""));
        assert!(json.contains("\"entidade_id\""));
        assert!(json.contains("\"previous_hash\""));
        Ok(())
    }

    #[test]
    fn test_chain_verification_constructors() {
        let ok = ChainVerification::intact(10);
        assert!(ok.valid);
        assert_eq!(ok.checked_events, 10);
        assert!(ok.broken_at.is_none());

        let bad = ChainVerification::broken(3, "evt_4", "previous_hash mismatch");
        assert!(!bad.valid);
        assert_eq!(bad.broken_at.as_deref(), Some("evt_4"));
    }
}
