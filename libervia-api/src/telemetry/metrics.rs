//! Gateway Metrics Registry
//!
//! All metric definitions live here, registered on an *owned*
//! `prometheus::Registry` instead of the process-global default. The
//! registry is constructed once at boot and passed through `AppState`, so
//! parallel tests can each hold their own without interfering.
//!
//! Tenant filtering and the JSON snapshot are derived from the text
//! exposition, which keeps them independent of the collector internals.

use libervia_core::TenantId;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::error::{ApiError, ApiResult};

/// HTTP latency buckets in milliseconds.
const HTTP_LATENCY_BUCKETS_MS: &[f64] = &[
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

/// Label value used when a request carries no tenant.
const NO_TENANT: &str = "";

/// Container for all gateway metrics.
#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    start: Instant,

    /// HTTP request counter - labels: method, route, status_code, tenant_id
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram (ms) - labels: method, route
    pub http_request_duration_ms: HistogramVec,

    /// HTTP error counter by category - labels: error_code (1xx..5xx), tenant_id
    pub http_errors_total: CounterVec,

    /// Auth failure counter - labels: tenant_id
    pub auth_failures_total: CounterVec,

    /// Cross-source tenant conflicts - labels: tenant_id
    pub tenant_conflicts_total: CounterVec,

    /// Rate-limited requests - labels: tenant_id
    pub rate_limited_total: CounterVec,

    /// Live core instances
    pub active_instances: Gauge,

    /// Registered (non-deleted) tenants
    pub tenants_total: Gauge,

    /// Process uptime in seconds
    pub process_uptime_seconds: Gauge,

    /// Process memory - labels: kind (rss, vms)
    pub process_memory_bytes: GaugeVec,
}

impl GatewayMetrics {
    /// Create and register all metrics on a fresh registry.
    pub fn new() -> ApiResult<Self> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("libervia_http_requests_total", "Total HTTP requests"),
            &["method", "route", "status_code", "tenant_id"],
        )
        .map_err(register_err)?;
        registry
            .register(Box::new(http_requests_total.clone()))
            .map_err(register_err)?;

        let http_request_duration_ms = HistogramVec::new(
            HistogramOpts::new(
                "libervia_http_request_duration_ms",
                "HTTP request duration in milliseconds",
            )
            .buckets(HTTP_LATENCY_BUCKETS_MS.to_vec()),
            &["method", "route"],
        )
        .map_err(register_err)?;
        registry
            .register(Box::new(http_request_duration_ms.clone()))
            .map_err(register_err)?;

        let http_errors_total = CounterVec::new(
            Opts::new(
                "libervia_http_errors_total",
                "HTTP error responses by status category",
            ),
            &["error_code", "tenant_id"],
        )
        .map_err(register_err)?;
        registry
            .register(Box::new(http_errors_total.clone()))
            .map_err(register_err)?;

        let auth_failures_total = CounterVec::new(
            Opts::new("libervia_auth_failures_total", "Authentication failures"),
            &["tenant_id"],
        )
        .map_err(register_err)?;
        registry
            .register(Box::new(auth_failures_total.clone()))
            .map_err(register_err)?;

        let tenant_conflicts_total = CounterVec::new(
            Opts::new(
                "libervia_tenant_conflicts_total",
                "Requests refused for conflicting tenant identifiers",
            ),
            &["tenant_id"],
        )
        .map_err(register_err)?;
        registry
            .register(Box::new(tenant_conflicts_total.clone()))
            .map_err(register_err)?;

        let rate_limited_total = CounterVec::new(
            Opts::new("libervia_rate_limited_total", "Rate-limited requests"),
            &["tenant_id"],
        )
        .map_err(register_err)?;
        registry
            .register(Box::new(rate_limited_total.clone()))
            .map_err(register_err)?;

        let active_instances = Gauge::new(
            "libervia_active_instances",
            "Live per-tenant core instances",
        )
        .map_err(register_err)?;
        registry
            .register(Box::new(active_instances.clone()))
            .map_err(register_err)?;

        let tenants_total = Gauge::new("libervia_tenants_total", "Registered tenants")
            .map_err(register_err)?;
        registry
            .register(Box::new(tenants_total.clone()))
            .map_err(register_err)?;

        let process_uptime_seconds = Gauge::new(
            "libervia_process_uptime_seconds",
            "Process uptime in seconds",
        )
        .map_err(register_err)?;
        registry
            .register(Box::new(process_uptime_seconds.clone()))
            .map_err(register_err)?;

        let process_memory_bytes = GaugeVec::new(
            Opts::new("libervia_process_memory_bytes", "Process memory by kind"),
            &["kind"],
        )
        .map_err(register_err)?;
        registry
            .register(Box::new(process_memory_bytes.clone()))
            .map_err(register_err)?;

        Ok(Self {
            registry,
            start: Instant::now(),
            http_requests_total,
            http_request_duration_ms,
            http_errors_total,
            auth_failures_total,
            tenant_conflicts_total,
            rate_limited_total,
            active_instances,
            tenants_total,
            process_uptime_seconds,
            process_memory_bytes,
        })
    }

    // ========================================================================
    // Recording
    // ========================================================================

    /// Record one finished HTTP request.
    pub fn record_http_request(
        &self,
        method: &str,
        route: &str,
        status: u16,
        tenant_id: Option<&str>,
        duration_ms: f64,
    ) {
        let tenant = tenant_id.unwrap_or(NO_TENANT);
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, route, &status_str, tenant])
            .inc();
        self.http_request_duration_ms
            .with_label_values(&[method, route])
            .observe(duration_ms);
        if status >= 400 {
            let category = format!("{}xx", status / 100);
            self.http_errors_total
                .with_label_values(&[&category, tenant])
                .inc();
        }
    }

    pub fn record_auth_failure(&self, tenant_id: Option<&str>) {
        self.auth_failures_total
            .with_label_values(&[tenant_id.unwrap_or(NO_TENANT)])
            .inc();
    }

    pub fn record_tenant_conflict(&self, tenant_id: Option<&str>) {
        self.tenant_conflicts_total
            .with_label_values(&[tenant_id.unwrap_or(NO_TENANT)])
            .inc();
    }

    pub fn record_rate_limited(&self, tenant_id: &str) {
        self.rate_limited_total
            .with_label_values(&[tenant_id])
            .inc();
    }

    pub fn set_active_instances(&self, count: usize) {
        self.active_instances.set(count as f64);
    }

    pub fn set_tenants_total(&self, count: usize) {
        self.tenants_total.set(count as f64);
    }

    /// Refresh uptime and memory gauges from the process.
    pub fn update_runtime_metrics(&self) {
        self.process_uptime_seconds
            .set(self.start.elapsed().as_secs_f64());
        if let Some((rss, vms)) = read_process_memory() {
            self.process_memory_bytes
                .with_label_values(&["rss"])
                .set(rss as f64);
            self.process_memory_bytes
                .with_label_values(&["vms"])
                .set(vms as f64);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start.elapsed().as_secs()
    }

    /// Resident set size in bytes, when observable.
    pub fn resident_memory_bytes(&self) -> Option<u64> {
        read_process_memory().map(|(rss, _)| rss)
    }

    // ========================================================================
    // Exporters
    // ========================================================================

    /// Prometheus text exposition of the whole registry.
    pub fn prometheus_output(&self) -> ApiResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| ApiError::internal(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| ApiError::internal(format!("Metrics output was not UTF-8: {}", e)))
    }

    /// Prometheus text exposition keeping only series labeled with this
    /// tenant. Unlabeled series and other tenants' values never appear.
    pub fn prometheus_output_for_tenant(&self, tenant_id: &TenantId) -> ApiResult<String> {
        let full = self.prometheus_output()?;
        Ok(filter_exposition_for_tenant(&full, tenant_id.as_str()))
    }

    /// JSON snapshot of every series: `{name: [{labels, value}]}`.
    pub fn snapshot(&self) -> ApiResult<serde_json::Value> {
        let full = self.prometheus_output()?;
        Ok(exposition_to_json(&full))
    }

    /// JSON snapshot filtered to one tenant's series.
    pub fn snapshot_for_tenant(&self, tenant_id: &TenantId) -> ApiResult<serde_json::Value> {
        let filtered = self.prometheus_output_for_tenant(tenant_id)?;
        Ok(exposition_to_json(&filtered))
    }
}

fn register_err(e: prometheus::Error) -> ApiError {
    ApiError::internal(format!("Failed to register metric: {}", e))
}

// ============================================================================
// EXPOSITION PROCESSING
// ============================================================================

/// One parsed sample line: `name{labels} value`.
#[derive(Debug, PartialEq)]
struct Sample {
    name: String,
    labels: BTreeMap<String, String>,
    value: f64,
}

/// Parse a sample line of the text exposition. Label values here are
/// gateway-controlled (methods, routes, slugs) and never contain quotes.
fn parse_sample(line: &str) -> Option<Sample> {
    let (series, value) = line.rsplit_once(' ')?;
    let value: f64 = value.parse().ok()?;

    let (name, labels) = match series.split_once('{') {
        Some((name, rest)) => {
            let body = rest.strip_suffix('}')?;
            let mut labels = BTreeMap::new();
            for pair in body.split(',').filter(|p| !p.is_empty()) {
                let (key, raw) = pair.split_once('=')?;
                let value = raw.strip_prefix('"')?.strip_suffix('"')?;
                labels.insert(key.to_string(), value.to_string());
            }
            (name.to_string(), labels)
        }
        None => (series.to_string(), BTreeMap::new()),
    };
    Some(Sample {
        name,
        labels,
        value,
    })
}

/// Keep only sample lines carrying `tenant_id="<tenant>"`, plus the HELP and
/// TYPE headers of families that retain at least one sample.
fn filter_exposition_for_tenant(exposition: &str, tenant: &str) -> String {
    let needle = format!("tenant_id=\"{}\"", tenant);
    let mut headers: Vec<&str> = Vec::new();
    let mut out = String::new();
    for line in exposition.lines() {
        if line.starts_with('#') {
            if line.starts_with("# HELP") {
                headers.clear();
            }
            headers.push(line);
            continue;
        }
        if line.contains(&needle) {
            for header in headers.drain(..) {
                out.push_str(header);
                out.push('\n');
            }
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Convert a text exposition into `{name: [{labels, value}]}`.
fn exposition_to_json(exposition: &str) -> serde_json::Value {
    use serde_json::{json, Map, Value};

    let mut root: Map<String, Value> = Map::new();
    for line in exposition.lines() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let Some(sample) = parse_sample(line) else {
            continue;
        };
        let labels: Map<String, Value> = sample
            .labels
            .into_iter()
            .map(|(k, v)| (k, json!(v)))
            .collect();
        let entry = root
            .entry(sample.name)
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(series) = entry {
            series.push(json!({ "labels": labels, "value": sample.value }));
        }
    }
    Value::Object(root)
}

/// Sum every sample of `name` in a parsed snapshot, optionally restricted to
/// samples whose `label` equals `value`. Used by the operational health
/// aggregation (a pure read).
pub fn sum_samples(
    snapshot: &serde_json::Value,
    name: &str,
    label_filter: Option<(&str, &str)>,
) -> f64 {
    let Some(series) = snapshot.get(name).and_then(|v| v.as_array()) else {
        return 0.0;
    };
    series
        .iter()
        .filter(|s| match label_filter {
            Some((key, value)) => s["labels"][key] == serde_json::json!(value),
            None => true,
        })
        .filter_map(|s| s["value"].as_f64())
        .sum()
}

/// Read `(rss, vms)` in bytes from `/proc/self/statm` where available.
fn read_process_memory() -> Option<(u64, u64)> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let mut fields = statm.split_whitespace();
    let vms_pages: u64 = fields.next()?.parse().ok()?;
    let rss_pages: u64 = fields.next()?.parse().ok()?;
    let page_size = 4096;
    Some((rss_pages * page_size, vms_pages * page_size))
}
