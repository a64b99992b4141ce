//! Operational counters and the read-and-reset telemetry snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Shared counters updated by the dispatcher and the token receiver.
///
/// Counts are monotonically increasing between snapshots; taking a
/// snapshot resets every field, so consecutive snapshots report
/// per-interval values.
#[derive(Debug, Default)]
pub struct DfoCounters {
    /// Completion tokens received, valid or not.
    tokens_received: AtomicU64,
    /// Trigger decisions successfully sent to a worker.
    decisions_sent: AtomicU64,
    /// Trigger decisions pulled from the decision source.
    decisions_received: AtomicU64,
    /// Wall time spent selecting a destination, in microseconds.
    deciding_destination_us: AtomicU64,
    /// Wall time spent waiting on the decision source, in microseconds.
    waiting_for_decision_us: AtomicU64,
    /// Wall time spent waiting for a free slot, in microseconds.
    waiting_for_slots_us: AtomicU64,
}

impl DfoCounters {
    /// Creates a zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        self.snapshot();
    }

    /// Counts one received completion token.
    pub fn record_token_received(&self) {
        self.tokens_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one successfully sent decision.
    pub fn record_decision_sent(&self) {
        self.decisions_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one decision pulled from the source.
    pub fn record_decision_received(&self) {
        self.decisions_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Accumulates wall time spent selecting a destination.
    pub fn add_deciding_destination(&self, elapsed: Duration) {
        self.deciding_destination_us
            .fetch_add(as_micros(elapsed), Ordering::Relaxed);
    }

    /// Accumulates wall time spent waiting on the decision source.
    pub fn add_waiting_for_decision(&self, elapsed: Duration) {
        self.waiting_for_decision_us
            .fetch_add(as_micros(elapsed), Ordering::Relaxed);
    }

    /// Accumulates wall time spent waiting for a free slot.
    pub fn add_waiting_for_slots(&self, elapsed: Duration) {
        self.waiting_for_slots_us
            .fetch_add(as_micros(elapsed), Ordering::Relaxed);
    }

    /// Takes a snapshot, resetting every counter.
    #[must_use]
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            tokens_received: self.tokens_received.swap(0, Ordering::Relaxed),
            decisions_sent: self.decisions_sent.swap(0, Ordering::Relaxed),
            decisions_received: self.decisions_received.swap(0, Ordering::Relaxed),
            deciding_destination_us: self.deciding_destination_us.swap(0, Ordering::Relaxed),
            waiting_for_decision_us: self.waiting_for_decision_us.swap(0, Ordering::Relaxed),
            waiting_for_slots_us: self.waiting_for_slots_us.swap(0, Ordering::Relaxed),
        }
    }
}

fn as_micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

/// Point-in-time view of the orchestrator's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct TelemetrySnapshot {
    /// Completion tokens received since the previous snapshot.
    pub tokens_received: u64,
    /// Decisions successfully sent since the previous snapshot.
    pub decisions_sent: u64,
    /// Decisions pulled from the source since the previous snapshot.
    pub decisions_received: u64,
    /// Microseconds spent selecting destinations since the previous snapshot.
    pub deciding_destination_us: u64,
    /// Microseconds spent waiting for decisions since the previous snapshot.
    pub waiting_for_decision_us: u64,
    /// Microseconds spent waiting for slots since the previous snapshot.
    pub waiting_for_slots_us: u64,
}
