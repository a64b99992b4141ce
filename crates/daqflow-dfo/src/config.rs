//! Configuration for the Data Flow Orchestrator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::worker::WorkerLoad;

/// Default queue timeout in milliseconds, used for the decision-source
/// poll and the transport send.
pub const DEFAULT_QUEUE_TIMEOUT_MS: u64 = 100;

/// Default number of send attempts per worker (first attempt included).
pub const DEFAULT_SEND_RETRIES: u32 = 2;

const fn default_queue_timeout_ms() -> u64 {
    DEFAULT_QUEUE_TIMEOUT_MS
}

const fn default_send_retries() -> u32 {
    DEFAULT_SEND_RETRIES
}

/// One configured trigger-record-builder application.
///
/// Accepted in two forms: a single `capacity` (busy and free thresholds
/// coincide), or an explicit `busy_threshold`/`free_threshold` pair with
/// `busy_threshold >= free_threshold`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrbConnection {
    /// Connection the worker receives trigger decisions on.
    pub decision_connection: String,
    /// Shorthand for equal busy and free thresholds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
    /// In-flight count at which the worker becomes busy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_threshold: Option<usize>,
    /// In-flight count below which the worker becomes free again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_threshold: Option<usize>,
}

impl TrbConnection {
    /// Creates an application entry in the capacity form.
    #[must_use]
    pub fn with_capacity(decision_connection: impl Into<String>, capacity: usize) -> Self {
        Self {
            decision_connection: decision_connection.into(),
            capacity: Some(capacity),
            busy_threshold: None,
            free_threshold: None,
        }
    }

    /// Creates an application entry in the explicit-threshold form.
    #[must_use]
    pub fn with_thresholds(
        decision_connection: impl Into<String>,
        busy_threshold: usize,
        free_threshold: usize,
    ) -> Self {
        Self {
            decision_connection: decision_connection.into(),
            capacity: None,
            busy_threshold: Some(busy_threshold),
            free_threshold: Some(free_threshold),
        }
    }

    /// Resolves the declared form to a `(busy, free)` threshold pair.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if neither form is fully declared,
    /// both are, or a threshold is zero.
    pub fn thresholds(&self) -> Result<(usize, usize)> {
        let (busy, free) = match (self.capacity, self.busy_threshold, self.free_threshold) {
            (Some(capacity), None, None) => (capacity, capacity),
            (None, Some(busy), Some(free)) => (busy, free),
            _ => {
                return Err(Error::configuration(format!(
                    "application '{}' must declare either capacity or both busy_threshold and free_threshold",
                    self.decision_connection
                )));
            }
        };

        if free == 0 {
            return Err(Error::configuration(format!(
                "application '{}' must have a free threshold of at least 1",
                self.decision_connection
            )));
        }

        Ok((busy, free))
    }

    /// Builds the [`WorkerLoad`] this entry describes.
    ///
    /// # Errors
    ///
    /// Returns the threshold-resolution errors of [`Self::thresholds`],
    /// or [`Error::ThresholdsNotConsistent`] when busy < free.
    pub fn build_worker(&self) -> Result<WorkerLoad> {
        let (busy, free) = self.thresholds()?;
        WorkerLoad::new(&self.decision_connection, busy, free)
    }
}

/// The recognized option set of the Data Flow Orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DfoConfig {
    /// The trigger-record-builder applications decisions are routed to.
    pub dataflow_applications: Vec<TrbConnection>,
    /// Timeout in milliseconds for the decision-source poll and the
    /// transport send.
    #[serde(default = "default_queue_timeout_ms")]
    pub general_queue_timeout_ms: u64,
    /// Connection completion tokens arrive on.
    pub token_connection: String,
    /// Number of send attempts per worker, first attempt included.
    #[serde(default = "default_send_retries")]
    pub td_send_retries: u32,
}

impl DfoConfig {
    /// Creates a configuration with no applications and default timings.
    #[must_use]
    pub fn new(token_connection: impl Into<String>) -> Self {
        Self {
            dataflow_applications: Vec::new(),
            general_queue_timeout_ms: DEFAULT_QUEUE_TIMEOUT_MS,
            token_connection: token_connection.into(),
            td_send_retries: DEFAULT_SEND_RETRIES,
        }
    }

    /// Adds a trigger-record-builder application.
    #[must_use]
    pub fn with_application(mut self, application: TrbConnection) -> Self {
        self.dataflow_applications.push(application);
        self
    }

    /// Sets the queue timeout.
    #[must_use]
    pub const fn with_queue_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.general_queue_timeout_ms = timeout_ms;
        self
    }

    /// Sets the number of send attempts per worker.
    #[must_use]
    pub const fn with_send_retries(mut self, retries: u32) -> Self {
        self.td_send_retries = retries;
        self
    }

    /// Returns the queue timeout as a [`Duration`].
    #[must_use]
    pub const fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.general_queue_timeout_ms)
    }

    /// Validates the full option set.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no application is declared,
    /// the retry count is zero, the token connection is empty, an
    /// application name repeats, or any application declares a malformed
    /// threshold form.
    pub fn validate(&self) -> Result<()> {
        if self.dataflow_applications.is_empty() {
            return Err(Error::configuration(
                "at least one dataflow application is required",
            ));
        }

        if self.td_send_retries == 0 {
            return Err(Error::configuration("td_send_retries must be at least 1"));
        }

        if self.token_connection.trim().is_empty() {
            return Err(Error::configuration("token_connection cannot be empty"));
        }

        let mut seen = std::collections::HashSet::new();
        for app in &self.dataflow_applications {
            if !seen.insert(app.decision_connection.as_str()) {
                return Err(Error::configuration(format!(
                    "duplicate dataflow application '{}'",
                    app.decision_connection
                )));
            }
            app.thresholds()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_form_resolves_to_equal_thresholds() {
        let app = TrbConnection::with_capacity("trb-01", 5);
        assert_eq!(app.thresholds().unwrap(), (5, 5));
    }

    #[test]
    fn threshold_form_resolves_as_declared() {
        let app = TrbConnection::with_thresholds("trb-01", 5, 2);
        assert_eq!(app.thresholds().unwrap(), (5, 2));
    }

    #[test]
    fn mixed_forms_are_rejected() {
        let app = TrbConnection {
            decision_connection: "trb-01".into(),
            capacity: Some(3),
            busy_threshold: Some(3),
            free_threshold: Some(1),
        };
        assert!(app.thresholds().is_err());
    }

    #[test]
    fn missing_free_threshold_is_rejected() {
        let app = TrbConnection {
            decision_connection: "trb-01".into(),
            capacity: None,
            busy_threshold: Some(3),
            free_threshold: None,
        };
        assert!(app.thresholds().is_err());
    }

    #[test]
    fn zero_free_threshold_is_rejected() {
        let app = TrbConnection::with_capacity("trb-01", 0);
        assert!(app.thresholds().is_err());
    }

    #[test]
    fn build_worker_rejects_busy_below_free() {
        let app = TrbConnection::with_thresholds("trb-01", 2, 3);
        let err = app.build_worker().expect_err("must reject");
        assert!(matches!(err, Error::ThresholdsNotConsistent { .. }));
    }

    #[test]
    fn config_defaults_apply_on_deserialization() {
        let config: DfoConfig = serde_json::from_str(
            r#"{
                "dataflow_applications": [
                    {"decision_connection": "trb-01", "capacity": 10}
                ],
                "token_connection": "trb_tokens"
            }"#,
        )
        .expect("parse");

        assert_eq!(config.general_queue_timeout_ms, DEFAULT_QUEUE_TIMEOUT_MS);
        assert_eq!(config.td_send_retries, DEFAULT_SEND_RETRIES);
        config.validate().expect("valid");
    }

    #[test]
    fn threshold_form_deserializes() {
        let config: DfoConfig = serde_json::from_str(
            r#"{
                "dataflow_applications": [
                    {"decision_connection": "trb-01", "busy_threshold": 8, "free_threshold": 4}
                ],
                "token_connection": "trb_tokens",
                "td_send_retries": 3
            }"#,
        )
        .expect("parse");

        config.validate().expect("valid");
        assert_eq!(
            config.dataflow_applications[0].thresholds().unwrap(),
            (8, 4)
        );
    }

    #[test]
    fn validate_rejects_empty_applications() {
        let config = DfoConfig::new("trb_tokens");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_retries() {
        let config = DfoConfig::new("trb_tokens")
            .with_application(TrbConnection::with_capacity("trb-01", 1))
            .with_send_retries(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_applications() {
        let config = DfoConfig::new("trb_tokens")
            .with_application(TrbConnection::with_capacity("trb-01", 1))
            .with_application(TrbConnection::with_capacity("trb-01", 2));
        assert!(config.validate().is_err());
    }

    #[test]
    fn queue_timeout_converts_to_duration() {
        let config = DfoConfig::new("trb_tokens").with_queue_timeout_ms(250);
        assert_eq!(config.queue_timeout(), Duration::from_millis(250));
    }
}
