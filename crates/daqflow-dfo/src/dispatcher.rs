//! The dispatch loop.
//!
//! A single dispatcher task fuses slot availability, decision intake,
//! worker selection, send retry, and error quarantine into one
//! cooperative flow:
//!
//! 1. wait until some worker has a slot (bounded 1 ms re-check)
//! 2. pull the next trigger decision from the source
//! 3. select a worker round-robin, skipping busy and quarantined ones
//! 4. send with bounded retries; exhaustion quarantines the worker and
//!    selection continues with the same decision
//! 5. on shutdown, drain the source best-effort
//!
//! Wall time spent in each phase is accumulated into the shared
//! counters so the telemetry snapshot can report where dispatch latency
//! went.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::Instrument;

use daqflow_core::observability::dispatch_span;

use crate::config::DfoConfig;
use crate::counters::DfoCounters;
use crate::decision::TriggerDecision;
use crate::metrics::DfoMetrics;
use crate::registry::{SelectionCursor, WorkerRegistry};
use crate::source::DecisionSource;
use crate::transport::Transport;
use crate::worker::Assignment;

/// Bound on one slot-available wait before the predicate is re-checked.
const SLOT_WAIT: Duration = Duration::from_millis(1);

/// The dispatch worker.
///
/// Owns the round-robin cursor; everything else is shared with the
/// token receiver and the command plane.
pub struct Dispatcher {
    registry: Arc<WorkerRegistry>,
    source: Arc<dyn DecisionSource>,
    transport: Arc<dyn Transport>,
    queue_timeout: Duration,
    send_retries: u32,
    run_flag: Arc<AtomicBool>,
    slot_notify: Arc<Notify>,
    counters: Arc<DfoCounters>,
    metrics: DfoMetrics,
    cursor: SelectionCursor,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.registry.len())
            .field("send_retries", &self.send_retries)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher over the shared run state.
    ///
    /// `run_flag`, `slot_notify`, and `counters` are shared with the
    /// token receiver and the command plane; the cursor starts at the
    /// first configured worker.
    #[must_use]
    pub fn new(
        registry: Arc<WorkerRegistry>,
        source: Arc<dyn DecisionSource>,
        transport: Arc<dyn Transport>,
        config: &DfoConfig,
        run_flag: Arc<AtomicBool>,
        slot_notify: Arc<Notify>,
        counters: Arc<DfoCounters>,
    ) -> Self {
        Self {
            registry,
            source,
            transport,
            queue_timeout: config.queue_timeout(),
            send_retries: config.td_send_retries,
            run_flag,
            slot_notify,
            counters,
            metrics: DfoMetrics::new(),
            cursor: SelectionCursor::new(),
        }
    }

    /// Runs the dispatch loop until the run flag clears, then drains the
    /// decision source best-effort.
    pub async fn run(mut self) {
        tracing::debug!(workers = self.registry.len(), "dispatcher starting");

        let mut last_slot_check = Instant::now();
        while self.run_flag.load(Ordering::Acquire) {
            if self.registry.has_any_slot() {
                let slot_available = Instant::now();
                self.counters
                    .add_waiting_for_slots(slot_available - last_slot_check);

                if let Some(routed_at) = self.pull_and_route(slot_available).await {
                    last_slot_check = routed_at;
                }
            } else {
                let _ = tokio::time::timeout(SLOT_WAIT, self.slot_notify.notified()).await;

                let now = Instant::now();
                self.counters.add_waiting_for_slots(now - last_slot_check);
                last_slot_check = now;
            }
        }

        self.drain().await;
        tracing::debug!("dispatcher stopped");
    }

    /// Blocks on the source until a decision arrives, routes it, and
    /// returns the instant routing finished. Returns `None` when the run
    /// flag cleared before a decision arrived.
    async fn pull_and_route(&mut self, slot_available: Instant) -> Option<Instant> {
        let mut waiting_since = slot_available;

        while self.run_flag.load(Ordering::Acquire) {
            match self.source.recv(self.queue_timeout).await {
                Some(decision) => {
                    let assignment_possible = Instant::now();
                    self.counters
                        .add_waiting_for_decision(assignment_possible - waiting_since);
                    self.counters.record_decision_received();
                    tracing::debug!(
                        trigger = %decision.trigger_number,
                        "pulled trigger decision"
                    );

                    self.route_decision(decision).await;

                    let assignment_complete = Instant::now();
                    self.counters
                        .add_deciding_destination(assignment_complete - assignment_possible);
                    return Some(assignment_complete);
                }
                None => {
                    // No decision this tick; keep the waiting counter
                    // current and poll again.
                    let now = Instant::now();
                    self.counters.add_waiting_for_decision(now - waiting_since);
                    waiting_since = now;
                }
            }
        }

        None
    }

    /// Routes one decision: selection, send with retries, quarantine on
    /// exhaustion. The decision is never discarded while the run flag is
    /// set; selection retries until some worker accepts it.
    async fn route_decision(&mut self, decision: TriggerDecision) {
        let payload = match decision.to_json() {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!(
                    trigger = %decision.trigger_number,
                    error = %error,
                    "discarding unserializable trigger decision"
                );
                return;
            }
        };

        while self.run_flag.load(Ordering::Acquire) {
            let Some(assignment) = self.find_slot(&decision) else {
                // Every worker is busy or quarantined; wait for a
                // completion to open a slot, then rescan.
                let _ = tokio::time::timeout(SLOT_WAIT, self.slot_notify.notified()).await;
                continue;
            };

            let span = dispatch_span(
                "send",
                assignment.trigger_number(),
                &assignment.connection_name,
            );
            if self
                .dispatch(&assignment, payload.as_bytes())
                .instrument(span)
                .await
            {
                if self.record_assignment(&assignment) {
                    return;
                }
            } else {
                self.quarantine(&assignment.connection_name);
            }
        }
    }

    /// Round-robin scan from the cursor's successor; at most one probe
    /// per worker. Returns an assignment on the first worker with a
    /// slot.
    fn find_slot(&mut self, decision: &TriggerDecision) -> Option<Arc<Assignment>> {
        let len = self.registry.len();
        for _ in 0..len {
            let worker = self.registry.nth(self.cursor.advance(len));
            if worker.has_slot() {
                return Some(worker.make_assignment(decision.clone()));
            }
        }

        None
    }

    /// Sends the serialized decision with up to `send_retries` attempts,
    /// the first included. Returns whether a send succeeded.
    async fn dispatch(&self, assignment: &Assignment, payload: &[u8]) -> bool {
        let connection = assignment.connection_name.as_str();

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self
                .transport
                .send_to(connection, payload, self.queue_timeout)
                .await
            {
                Ok(()) => {
                    self.counters.record_decision_sent();
                    self.metrics.record_decision(connection, "sent");
                    return true;
                }
                Err(error) => {
                    tracing::warn!(
                        attempt = attempts,
                        error = %error,
                        "send to trigger record builder failed"
                    );
                    self.metrics.record_decision(connection, "failed");
                }
            }

            if attempts >= self.send_retries || !self.run_flag.load(Ordering::Acquire) {
                return false;
            }
        }
    }

    /// Records a sent assignment on its worker. Returns whether the
    /// worker accepted it; a rejection (error flag raced in) is a
    /// worker-level failure and selection continues.
    fn record_assignment(&self, assignment: &Arc<Assignment>) -> bool {
        let Some(worker) = self.registry.get(&assignment.connection_name) else {
            // Registry membership is frozen while the dispatcher runs.
            tracing::warn!(
                connection = %assignment.connection_name,
                "assignment targets a worker missing from the registry"
            );
            return false;
        };

        match worker.add_assignment(Arc::clone(assignment)) {
            Ok(()) => {
                self.metrics
                    .set_inflight(&assignment.connection_name, worker.inflight_len());
                true
            }
            Err(error) => {
                tracing::warn!(
                    connection = %assignment.connection_name,
                    error = %error,
                    "worker rejected a sent assignment"
                );
                false
            }
        }
    }

    /// Quarantines a worker whose sends exhausted their retries.
    fn quarantine(&self, connection: &str) {
        if let Some(worker) = self.registry.get(connection) {
            worker.set_in_error(true);
        }
        self.metrics.record_quarantine(connection);
        tracing::warn!(
            connection = connection,
            "could not send trigger decision; quarantining trigger record builder"
        );
    }

    /// Best-effort shutdown drain: one selection and one send attempt
    /// per remaining decision; unsent decisions are lost.
    async fn drain(&mut self) {
        while let Some(decision) = self.source.try_recv().await {
            let Some(assignment) = self.find_slot(&decision) else {
                tracing::warn!(
                    trigger = %decision.trigger_number,
                    "discarding trigger decision at shutdown: no worker available"
                );
                continue;
            };

            let Ok(payload) = decision.to_json() else {
                continue;
            };

            let span = dispatch_span(
                "drain",
                assignment.trigger_number(),
                &assignment.connection_name,
            );
            if self
                .dispatch(&assignment, payload.as_bytes())
                .instrument(span)
                .await
            {
                let _ = self.record_assignment(&assignment);
            } else {
                tracing::warn!(
                    trigger = %decision.trigger_number,
                    connection = %assignment.connection_name,
                    "discarding trigger decision at shutdown: send failed"
                );
            }
        }
    }
}
