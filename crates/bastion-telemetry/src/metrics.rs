//! Prometheus metrics.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `bastion_refresh_cycles_total` | Counter | `trigger` | Refresh cycles run |
//! | `bastion_refresh_duration_seconds` | Histogram | `trigger` | Refresh cycle latency |
//! | `bastion_rule_fetch_failures_total` | Counter | `service`, `kind` | Failed rule fetches |
//! | `bastion_rule_sets_updated_total` | Counter | - | Cache entries replaced |
//! | `bastion_cached_services` | Gauge | - | Services held in the rule cache |
//! | `bastion_refresh_events_suppressed_total` | Counter | - | Topology events dropped by debounce |
//! | `bastion_authz_decisions_total` | Counter | `decision`, `reason` | Authorization decisions |
//!
//! Every recording function is a no-op until a recorder is installed.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Metric names.
pub mod names {
    /// Refresh cycles run.
    pub const REFRESH_CYCLES: &str = "bastion_refresh_cycles_total";
    /// Refresh cycle latency.
    pub const REFRESH_DURATION: &str = "bastion_refresh_duration_seconds";
    /// Failed rule fetches.
    pub const FETCH_FAILURES: &str = "bastion_rule_fetch_failures_total";
    /// Cache entries replaced.
    pub const RULE_SETS_UPDATED: &str = "bastion_rule_sets_updated_total";
    /// Services held in the rule cache.
    pub const CACHED_SERVICES: &str = "bastion_cached_services";
    /// Topology events dropped by debounce.
    pub const EVENTS_SUPPRESSED: &str = "bastion_refresh_events_suppressed_total";
    /// Authorization decisions.
    pub const AUTHZ_DECISIONS: &str = "bastion_authz_decisions_total";
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether to install the Prometheus exporter.
    pub enabled: bool,

    /// Address the exporter listens on.
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Installs the Prometheus recorder and spawns its HTTP listener on
/// `config.addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(addr)
        .build()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = exporter.await {
            tracing::error!(error = ?e, "metrics listener stopped");
        }
    });

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();
    tracing::info!(%addr, "metrics listener started");
    Ok(())
}

/// Renders metrics in Prometheus text format, if initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(names::REFRESH_CYCLES, "Rule refresh cycles run, by trigger");
    describe_histogram!(names::REFRESH_DURATION, "Rule refresh cycle duration in seconds");
    describe_counter!(names::FETCH_FAILURES, "Failed rule set fetches, by service and kind");
    describe_counter!(names::RULE_SETS_UPDATED, "Rule cache entries replaced");
    describe_gauge!(names::CACHED_SERVICES, "Services currently held in the rule cache");
    describe_counter!(
        names::EVENTS_SUPPRESSED,
        "Topology change events dropped by the debounce window"
    );
    describe_counter!(names::AUTHZ_DECISIONS, "Authorization decisions, by outcome and reason");
}

/// Records a completed refresh cycle.
pub fn record_refresh(trigger: &'static str, updated: usize, duration: Duration) {
    counter!(names::REFRESH_CYCLES, "trigger" => trigger).increment(1);
    histogram!(names::REFRESH_DURATION, "trigger" => trigger).record(duration.as_secs_f64());
    counter!(names::RULE_SETS_UPDATED).increment(updated as u64);
}

/// Records a failed fetch for one service.
pub fn record_fetch_failure(service: &str, kind: &'static str) {
    counter!(
        names::FETCH_FAILURES,
        "service" => service.to_string(),
        "kind" => kind
    )
    .increment(1);
}

/// Sets the number of cached services.
pub fn set_cached_services(count: usize) {
    gauge!(names::CACHED_SERVICES).set(count as f64);
}

/// Records a topology event dropped by debounce.
pub fn record_event_suppressed() {
    counter!(names::EVENTS_SUPPRESSED).increment(1);
}

/// Records an authorization decision.
pub fn record_decision(allowed: bool, reason: &'static str) {
    let decision = if allowed { "allow" } else { "deny" };
    counter!(
        names::AUTHZ_DECISIONS,
        "decision" => decision,
        "reason" => reason
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_disabled() {
        let config = MetricsConfig::default();
        assert!(!config.enabled);
        assert!(init_metrics(&config).is_ok());
    }

    #[test]
    fn test_invalid_address() {
        let config = MetricsConfig {
            enabled: true,
            addr: "not-an-address".to_string(),
        };
        assert!(matches!(
            init_metrics(&config),
            Err(TelemetryError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_record_functions_dont_panic() {
        record_refresh("periodic", 3, Duration::from_millis(12));
        record_fetch_failure("orders", "timeout");
        set_cached_services(4);
        record_event_suppressed();
        record_decision(false, "missing_role");
    }

    #[test]
    fn test_render_without_init() {
        assert!(render_metrics().is_none());
    }
}
