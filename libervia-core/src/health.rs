//! Operational health assessment types
//!
//! Shapes shared between the telemetry aggregator and the internal health
//! endpoints. The assessment itself is computed in `libervia-api`.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Overall process status derived from individual checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationalStatus {
    Ok,
    Degraded,
    Critical,
}

/// Status of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Ok,
    Warn,
    Critical,
}

/// One named threshold check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationalCheck {
    pub name: String,
    pub status: CheckStatus,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slo_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_ref: Option<String>,
}

impl OperationalCheck {
    /// Build a check with the status implied by warn/critical thresholds
    /// (higher value = worse).
    pub fn thresholded(
        name: impl Into<String>,
        value: f64,
        warn: f64,
        critical: f64,
        message: impl Into<String>,
    ) -> Self {
        let status = if value >= critical {
            CheckStatus::Critical
        } else if value >= warn {
            CheckStatus::Warn
        } else {
            CheckStatus::Ok
        };
        Self {
            name: name.into(),
            status,
            value,
            threshold: Some(warn),
            message: message.into(),
            slo_ref: None,
            alert_ref: None,
        }
    }
}

/// Aggregated assessment returned by `/internal/health/operational`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationalAssessment {
    pub status: OperationalStatus,
    pub timestamp: Timestamp,
    pub uptime_seconds: u64,
    pub checks: Vec<OperationalCheck>,
    pub summary: String,
}

impl OperationalAssessment {
    /// Fold individual check statuses into the overall status: CRITICAL wins
    /// over DEGRADED wins over OK.
    pub fn overall(checks: &[OperationalCheck]) -> OperationalStatus {
        if checks.iter().any(|c| c.status == CheckStatus::Critical) {
            OperationalStatus::Critical
        } else if checks.iter().any(|c| c.status == CheckStatus::Warn) {
            OperationalStatus::Degraded
        } else {
            OperationalStatus::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholded_statuses() {
        let ok = OperationalCheck::thresholded("memory_heap", 100.0, 500.0, 800.0, "heap MB");
        assert_eq!(ok.status, CheckStatus::Ok);

        let warn = OperationalCheck::thresholded("memory_heap", 512.0, 500.0, 800.0, "heap MB");
        assert_eq!(warn.status, CheckStatus::Warn);

        let critical = OperationalCheck::thresholded("memory_heap", 900.0, 500.0, 800.0, "heap MB");
        assert_eq!(critical.status, CheckStatus::Critical);
    }

    #[test]
    fn test_overall_escalation() {
        let mut checks = vec![
            OperationalCheck::thresholded("a", 0.0, 1.0, 2.0, ""),
            OperationalCheck::thresholded("b", 0.0, 1.0, 2.0, ""),
        ];
        assert_eq!(
            OperationalAssessment::overall(&checks),
            OperationalStatus::Ok
        );

        checks[0].status = CheckStatus::Warn;
        assert_eq!(
            OperationalAssessment::overall(&checks),
            OperationalStatus::Degraded
        );

        checks[1].status = CheckStatus::Critical;
        assert_eq!(
            OperationalAssessment::overall(&checks),
            OperationalStatus::Critical
        );
    }

    #[test]
    fn test_status_serialization() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&OperationalStatus::Ok)?, "\"OK\"");
        assert_eq!(
            serde_json::to_string(&OperationalStatus::Degraded)?,
            "\"DEGRADED\""
        );
        assert_eq!(serde_json::to_string(&CheckStatus::Warn)?, "\"WARN\"");
        Ok(())
    }
}
