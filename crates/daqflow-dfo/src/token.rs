//! Completion-token handling.
//!
//! The [`TokenReceiver`] is invoked by the transport for every message
//! arriving on the token connection. It releases the matching assignment
//! on the worker that completed it, lifts error quarantine, and wakes the
//! dispatcher's slot wait. It never blocks: every operation it performs
//! is a short critical section or an atomic.

use std::sync::Arc;

use tokio::sync::Notify;

use daqflow_core::observability::dispatch_span;
use daqflow_core::RunNumber;

use crate::counters::DfoCounters;
use crate::decision::CompletionToken;
use crate::metrics::DfoMetrics;
use crate::registry::WorkerRegistry;
use crate::transport::TokenCallback;
use crate::worker::MetadataFn;

/// Handles completion tokens for one run.
///
/// Created at run start with the run number captured from the start
/// command; tokens from any other run are dropped. Token delivery is
/// at-most-once on the transport side; duplicates degrade to
/// absent-assignment warnings here.
pub struct TokenReceiver {
    registry: Arc<WorkerRegistry>,
    run_number: RunNumber,
    counters: Arc<DfoCounters>,
    metrics: DfoMetrics,
    slot_notify: Arc<Notify>,
    metadata_fn: Option<Arc<MetadataFn>>,
}

impl std::fmt::Debug for TokenReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenReceiver")
            .field("run_number", &self.run_number)
            .finish_non_exhaustive()
    }
}

impl TokenReceiver {
    /// Creates a receiver for the given run.
    #[must_use]
    pub fn new(
        registry: Arc<WorkerRegistry>,
        run_number: RunNumber,
        counters: Arc<DfoCounters>,
        slot_notify: Arc<Notify>,
    ) -> Self {
        Self {
            registry,
            run_number,
            counters,
            metrics: DfoMetrics::new(),
            slot_notify,
            metadata_fn: None,
        }
    }

    /// Installs the function applied to a worker's metadata accumulator
    /// on each completion.
    #[must_use]
    pub fn with_metadata_fn(mut self, metadata_fn: Arc<MetadataFn>) -> Self {
        self.metadata_fn = Some(metadata_fn);
        self
    }

    /// Decodes a raw transport payload and processes the token.
    ///
    /// Malformed payloads are logged and dropped; they do not count as
    /// received tokens.
    pub fn handle_payload(&self, payload: &[u8]) {
        let token = match std::str::from_utf8(payload)
            .map_err(|e| e.to_string())
            .and_then(|text| CompletionToken::from_json(text).map_err(|e| e.to_string()))
        {
            Ok(token) => token,
            Err(error) => {
                tracing::warn!(error = %error, "discarding undecodable completion token");
                self.metrics.record_token("decode_error");
                return;
            }
        };

        self.handle(&token);
    }

    /// Processes one completion token.
    pub fn handle(&self, token: &CompletionToken) {
        self.counters.record_token_received();

        if token.run_number != self.run_number {
            tracing::debug!(
                token_run = %token.run_number,
                current_run = %self.run_number,
                "dropping completion token from another run"
            );
            self.metrics.record_token("foreign_run");
            return;
        }

        let span = dispatch_span("complete", token.trigger_number, &token.decision_destination);
        let _guard = span.enter();

        let Some(worker) = self.registry.get(&token.decision_destination) else {
            tracing::warn!("completion token names an unknown worker");
            self.metrics.record_token("unknown_worker");
            return;
        };

        match worker.complete_assignment(token.trigger_number, self.metadata_fn.as_deref()) {
            Ok(service_time) => {
                self.metrics
                    .observe_service_time(&token.decision_destination, service_time);
                self.metrics
                    .set_inflight(&token.decision_destination, worker.inflight_len());
                self.metrics.record_token("completed");
                tracing::debug!(
                    service_time_us = u64::try_from(service_time.as_micros()).unwrap_or(u64::MAX),
                    "assignment completed"
                );
            }
            Err(error) => {
                // Duplicate or stale token; the worker keeps running.
                tracing::warn!(error = %error, "completion token matched no assignment");
                self.metrics.record_token("unmatched");
            }
        }

        if worker.is_in_error() {
            worker.set_in_error(false);
            tracing::info!("trigger record builder has reconnected");
        }

        // The completion may have crossed the hysteresis boundary; the
        // dispatcher re-checks the slot predicate on wake.
        self.slot_notify.notify_waiters();
    }

    /// Wraps the receiver in the transport callback type.
    #[must_use]
    pub fn into_callback(self: Arc<Self>) -> TokenCallback {
        Arc::new(move |payload: &[u8]| self.handle_payload(payload))
    }
}
