//! Operational health aggregation.
//!
//! Derives an OK / DEGRADED / CRITICAL verdict from the telemetry registry.
//! The assessment is a pure read: it works on a gathered snapshot and never
//! increments or resets anything.

use chrono::Utc;
use libervia_core::{CheckStatus, OperationalAssessment, OperationalCheck, OperationalStatus};

use crate::error::ApiResult;
use crate::telemetry::metrics::{sum_samples, GatewayMetrics};

const MB: f64 = 1024.0 * 1024.0;

/// Fixed thresholds, matching the operations runbook.
mod thresholds {
    /// memory_heap in MB
    pub const MEMORY_WARN_MB: f64 = 500.0;
    pub const MEMORY_CRITICAL_MB: f64 = 800.0;

    /// process_uptime: WARN below this many seconds (recent restart)
    pub const UPTIME_WARN_SECS: f64 = 300.0;

    /// error_rate_5xx as a percentage of requests
    pub const ERROR_RATE_WARN_PCT: f64 = 0.1;
    pub const ERROR_RATE_CRITICAL_PCT: f64 = 1.0;

    /// auth_failures per second of uptime
    pub const AUTH_FAILURES_WARN_PER_SEC: f64 = 1.0;
    pub const AUTH_FAILURES_CRITICAL_PER_SEC: f64 = 10.0;

    /// tenant_conflicts, absolute
    pub const CONFLICTS_WARN: f64 = 1.0;
    pub const CONFLICTS_CRITICAL: f64 = 10.0;

    /// rate_limit_abuse as a percentage of requests
    pub const RATE_LIMIT_WARN_PCT: f64 = 5.0;
    pub const RATE_LIMIT_CRITICAL_PCT: f64 = 20.0;
}

/// Run every check against the current telemetry snapshot.
pub fn assess(metrics: &GatewayMetrics) -> ApiResult<OperationalAssessment> {
    let snapshot = metrics.snapshot()?;
    let uptime = metrics.uptime_seconds();
    let uptime_f = (uptime as f64).max(1.0);

    let requests = sum_samples(&snapshot, "libervia_http_requests_total", None);
    let errors_5xx = sum_samples(
        &snapshot,
        "libervia_http_errors_total",
        Some(("error_code", "5xx")),
    );
    let auth_failures = sum_samples(&snapshot, "libervia_auth_failures_total", None);
    let conflicts = sum_samples(&snapshot, "libervia_tenant_conflicts_total", None);
    let rate_limited = sum_samples(&snapshot, "libervia_rate_limited_total", None);

    let mut checks = Vec::with_capacity(6);

    let memory_mb = metrics
        .resident_memory_bytes()
        .map(|b| b as f64 / MB)
        .unwrap_or(0.0);
    checks.push(
        OperationalCheck::thresholded(
            "memory_heap",
            memory_mb,
            thresholds::MEMORY_WARN_MB,
            thresholds::MEMORY_CRITICAL_MB,
            format!("{:.0} MB resident", memory_mb),
        ),
    );

    // Uptime check inverts the scale: young processes WARN
    let uptime_status = if (uptime as f64) < thresholds::UPTIME_WARN_SECS {
        CheckStatus::Warn
    } else {
        CheckStatus::Ok
    };
    checks.push(OperationalCheck {
        name: "process_uptime".to_string(),
        status: uptime_status,
        value: uptime as f64,
        threshold: Some(thresholds::UPTIME_WARN_SECS),
        message: format!("{}s since boot", uptime),
        slo_ref: None,
        alert_ref: None,
    });

    let error_rate = if requests > 0.0 {
        errors_5xx / requests * 100.0
    } else {
        0.0
    };
    checks.push(OperationalCheck::thresholded(
        "error_rate_5xx",
        error_rate,
        thresholds::ERROR_RATE_WARN_PCT,
        thresholds::ERROR_RATE_CRITICAL_PCT,
        format!("{:.3}% of {} requests", error_rate, requests as u64),
    ));

    let auth_failure_rate = auth_failures / uptime_f;
    checks.push(OperationalCheck::thresholded(
        "auth_failures",
        auth_failure_rate,
        thresholds::AUTH_FAILURES_WARN_PER_SEC,
        thresholds::AUTH_FAILURES_CRITICAL_PER_SEC,
        format!("{:.2}/s over process lifetime", auth_failure_rate),
    ));

    checks.push(OperationalCheck::thresholded(
        "tenant_conflicts",
        conflicts,
        thresholds::CONFLICTS_WARN,
        thresholds::CONFLICTS_CRITICAL,
        format!("{} conflicting requests refused", conflicts as u64),
    ));

    let rate_limit_pct = if requests > 0.0 {
        rate_limited / requests * 100.0
    } else {
        0.0
    };
    checks.push(OperationalCheck::thresholded(
        "rate_limit_abuse",
        rate_limit_pct,
        thresholds::RATE_LIMIT_WARN_PCT,
        thresholds::RATE_LIMIT_CRITICAL_PCT,
        format!("{:.1}% of requests rate-limited", rate_limit_pct),
    ));

    let status = OperationalAssessment::overall(&checks);
    let summary = match status {
        OperationalStatus::Ok => "all checks passing".to_string(),
        OperationalStatus::Degraded => {
            let warned: Vec<&str> = checks
                .iter()
                .filter(|c| c.status == CheckStatus::Warn)
                .map(|c| c.name.as_str())
                .collect();
            format!("degraded: {}", warned.join(", "))
        }
        OperationalStatus::Critical => {
            let critical: Vec<&str> = checks
                .iter()
                .filter(|c| c.status == CheckStatus::Critical)
                .map(|c| c.name.as_str())
                .collect();
            format!("critical: {}", critical.join(", "))
        }
    };

    Ok(OperationalAssessment {
        status,
        timestamp: Utc::now(),
        uptime_seconds: uptime,
        checks,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> GatewayMetrics {
        match GatewayMetrics::new() {
            Ok(m) => m,
            Err(e) => panic!("metrics init failed: {}", e.message),
        }
    }

    #[test]
    fn test_fresh_process_is_degraded_by_uptime_only() -> ApiResult<()> {
        let m = metrics();
        let assessment = assess(&m)?;
        // A just-booted process trips the uptime WARN and nothing else
        let uptime_check = assessment
            .checks
            .iter()
            .find(|c| c.name == "process_uptime");
        assert_eq!(uptime_check.map(|c| c.status), Some(CheckStatus::Warn));
        assert_eq!(assessment.status, OperationalStatus::Degraded);
        Ok(())
    }

    #[test]
    fn test_heavy_5xx_rate_is_critical() -> ApiResult<()> {
        let m = metrics();
        for _ in 0..90 {
            m.record_http_request("GET", "/a", 200, None, 1.0);
        }
        for _ in 0..10 {
            m.record_http_request("GET", "/a", 500, None, 1.0);
        }
        let assessment = assess(&m)?;
        let check = assessment
            .checks
            .iter()
            .find(|c| c.name == "error_rate_5xx");
        assert_eq!(check.map(|c| c.status), Some(CheckStatus::Critical));
        assert_eq!(assessment.status, OperationalStatus::Critical);
        Ok(())
    }

    #[test]
    fn test_conflicts_trip_warn_then_critical() -> ApiResult<()> {
        let m = metrics();
        m.record_tenant_conflict(None);
        let assessment = assess(&m)?;
        let check = assessment
            .checks
            .iter()
            .find(|c| c.name == "tenant_conflicts");
        assert_eq!(check.map(|c| c.status), Some(CheckStatus::Warn));

        for _ in 0..10 {
            m.record_tenant_conflict(None);
        }
        let assessment = assess(&m)?;
        assert_eq!(assessment.status, OperationalStatus::Critical);
        Ok(())
    }

    #[test]
    fn test_assessment_is_a_pure_read() -> ApiResult<()> {
        let m = metrics();
        m.record_http_request("GET", "/a", 200, None, 1.0);
        let before = m.snapshot()?;
        for _ in 0..100 {
            assess(&m)?;
        }
        let mut after = m.snapshot()?;
        // Uptime moves on its own; everything else must be untouched
        if let Some(obj) = after.as_object_mut() {
            obj.remove("libervia_process_uptime_seconds");
        }
        let mut before = before;
        if let Some(obj) = before.as_object_mut() {
            obj.remove("libervia_process_uptime_seconds");
        }
        assert_eq!(before, after);
        Ok(())
    }
}
