//! Observability metrics for the Data Flow Orchestrator.
//!
//! This module provides Prometheus-compatible metrics for monitoring the
//! dispatch path. Metrics are designed to support:
//!
//! - **Alerting**: quarantined workers and send-failure rates
//! - **Dashboards**: real-time visibility into per-worker load
//! - **Debugging**: correlating dispatch latency with worker saturation
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `daqflow_dfo_decisions_total` | Counter | `connection`, `result` | Decision send attempts by outcome |
//! | `daqflow_dfo_tokens_total` | Counter | `result` | Completion tokens by disposition |
//! | `daqflow_dfo_inflight_assignments` | Gauge | `connection` | In-flight assignments per worker |
//! | `daqflow_dfo_service_time_seconds` | Histogram | `connection` | Assignment service time |
//! | `daqflow_dfo_worker_quarantines_total` | Counter | `connection` | Workers entering error quarantine |
//!
//! ## Integration
//!
//! Metrics are exposed via the `metrics` crate facade. To export to
//! Prometheus:
//!
//! ```rust,ignore
//! use metrics_exporter_prometheus::PrometheusBuilder;
//!
//! PrometheusBuilder::new()
//!     .with_http_listener(([0, 0, 0, 0], 9090))
//!     .install()
//!     .expect("failed to install Prometheus recorder");
//! ```

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: decision send attempts by outcome.
    pub const DECISIONS_TOTAL: &str = "daqflow_dfo_decisions_total";
    /// Counter: completion tokens by disposition.
    pub const TOKENS_TOTAL: &str = "daqflow_dfo_tokens_total";
    /// Gauge: in-flight assignments per worker.
    pub const INFLIGHT_ASSIGNMENTS: &str = "daqflow_dfo_inflight_assignments";
    /// Histogram: assignment service time in seconds.
    pub const SERVICE_TIME_SECONDS: &str = "daqflow_dfo_service_time_seconds";
    /// Counter: workers entering error quarantine.
    pub const WORKER_QUARANTINES_TOTAL: &str = "daqflow_dfo_worker_quarantines_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Worker connection name.
    pub const CONNECTION: &str = "connection";
    /// Outcome (sent, failed, completed, foreign_run, unknown_worker, unmatched).
    pub const RESULT: &str = "result";
}

/// High-level interface for recording orchestration metrics.
///
/// Cheap to clone and share across tasks.
#[derive(Debug, Clone, Default)]
pub struct DfoMetrics {
    _private: (),
}

impl DfoMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one decision send attempt and its outcome.
    pub fn record_decision(&self, connection: &str, result: &str) {
        counter!(
            names::DECISIONS_TOTAL,
            labels::CONNECTION => connection.to_string(),
            labels::RESULT => result.to_string(),
        )
        .increment(1);
    }

    /// Records one completion token and its disposition.
    pub fn record_token(&self, result: &str) {
        counter!(
            names::TOKENS_TOTAL,
            labels::RESULT => result.to_string(),
        )
        .increment(1);
    }

    /// Updates the in-flight gauge for a worker.
    #[allow(clippy::cast_precision_loss)] // Gauge values are typically small
    pub fn set_inflight(&self, connection: &str, depth: usize) {
        gauge!(
            names::INFLIGHT_ASSIGNMENTS,
            labels::CONNECTION => connection.to_string(),
        )
        .set(depth as f64);
    }

    /// Records the service time of one completed assignment.
    pub fn observe_service_time(&self, connection: &str, service_time: Duration) {
        histogram!(
            names::SERVICE_TIME_SECONDS,
            labels::CONNECTION => connection.to_string(),
        )
        .record(service_time.as_secs_f64());
    }

    /// Records a worker entering error quarantine.
    pub fn record_quarantine(&self, connection: &str) {
        counter!(
            names::WORKER_QUARANTINES_TOTAL,
            labels::CONNECTION => connection.to_string(),
        )
        .increment(1);
    }
}
