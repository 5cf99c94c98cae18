//! Prometheus metrics for nodegroup-guard
//!
//! # Exported metrics
//! - `nodegroup_guard_health_decisions_total` (counter): health decisions labeled by decision.
//! - `nodegroup_guard_health_check_results_total` (counter): per-check results labeled by check and status.
//! - `nodegroup_guard_update_outcomes_total` (counter): terminal update statuses labeled by status.
//! - `nodegroup_guard_monitor_sessions_total` (counter): monitoring sessions labeled by outcome.
//! - `nodegroup_guard_status_poll_retries_total` (counter): retried status queries.

use std::sync::atomic::AtomicU64;

use once_cell::sync::Lazy;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

use crate::health::HealthSummary;
use crate::monitor::MonitorReport;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DecisionLabels {
    /// PROCEED, WARN or BLOCK
    pub decision: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CheckLabels {
    pub check: String,
    pub status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StatusLabels {
    pub status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: String,
}

pub static HEALTH_DECISIONS_TOTAL: Lazy<Family<DecisionLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static HEALTH_CHECK_RESULTS_TOTAL: Lazy<Family<CheckLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static UPDATE_OUTCOMES_TOTAL: Lazy<Family<StatusLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static MONITOR_SESSIONS_TOTAL: Lazy<Family<OutcomeLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static STATUS_POLL_RETRIES_TOTAL: Lazy<Counter<u64, AtomicU64>> = Lazy::new(Counter::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "nodegroup_guard_health_decisions",
        "Health gate decisions",
        HEALTH_DECISIONS_TOTAL.clone(),
    );
    registry.register(
        "nodegroup_guard_health_check_results",
        "Individual health check results",
        HEALTH_CHECK_RESULTS_TOTAL.clone(),
    );
    registry.register(
        "nodegroup_guard_update_outcomes",
        "Terminal statuses of monitored updates",
        UPDATE_OUTCOMES_TOTAL.clone(),
    );
    registry.register(
        "nodegroup_guard_monitor_sessions",
        "Monitoring sessions by outcome",
        MONITOR_SESSIONS_TOTAL.clone(),
    );
    registry.register(
        "nodegroup_guard_status_poll_retries",
        "Status queries retried after a transient failure",
        STATUS_POLL_RETRIES_TOTAL.clone(),
    );

    registry
});

/// Record a health evaluation and each of its check results.
pub fn record_health_summary(summary: &HealthSummary) {
    HEALTH_DECISIONS_TOTAL
        .get_or_create(&DecisionLabels {
            decision: summary.decision.to_string(),
        })
        .inc();

    for r in &summary.results {
        HEALTH_CHECK_RESULTS_TOTAL
            .get_or_create(&CheckLabels {
                check: r.name.clone(),
                status: r.status.to_string(),
            })
            .inc();
    }
}

/// Record a finished monitoring session and the updates it saw finish.
pub fn record_monitor_report(report: &MonitorReport) {
    MONITOR_SESSIONS_TOTAL
        .get_or_create(&OutcomeLabels {
            outcome: report.outcome.to_string(),
        })
        .inc();

    for u in report.updates.iter().filter(|u| u.status.is_terminal()) {
        UPDATE_OUTCOMES_TOTAL
            .get_or_create(&StatusLabels {
                status: u.status.to_string(),
            })
            .inc();
    }
}

pub fn record_status_poll_retry() {
    STATUS_POLL_RETRIES_TOTAL.inc();
}

/// Text exposition of the registry
pub fn render() -> String {
    let mut buffer = String::new();
    if let Err(e) = encode(&mut buffer, &REGISTRY) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    buffer
}
