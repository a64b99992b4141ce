//! Per-worker in-flight load tracking.
//!
//! [`WorkerLoad`] represents the current state of one trigger-record
//! builder: its outstanding assignments, busy/free hysteresis, error
//! quarantine flag, and a bounded window of recent service times.
//!
//! ## Thread Safety
//!
//! One mutex guards the in-flight queue together with every store to the
//! busy flag, so any reader of `is_busy` observes a value consistent with
//! some past state of the queue. The busy and error flags themselves are
//! atomics, which keeps [`WorkerLoad::has_slot`] wait-free for the
//! dispatcher's slot scan. The latency window and the metadata accumulator
//! are each guarded by their own mutex so telemetry readers never contend
//! with the dispatch path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;

use daqflow_core::TriggerNumber;

use crate::decision::TriggerDecision;
use crate::error::{Error, Result};

/// Maximum number of samples retained in the latency window.
pub const LATENCY_WINDOW_CAPACITY: usize = 1000;

/// Callback applied to a worker's metadata accumulator on each completion.
pub type MetadataFn = dyn Fn(&mut Value) + Send + Sync;

/// An immutable binding of a trigger decision to a specific worker.
///
/// Created at dispatch time and held both by the dispatcher (briefly,
/// while the send is in flight) and by the owning [`WorkerLoad`] (until
/// completion or teardown), hence the `Arc` in every signature.
#[derive(Debug, Clone)]
pub struct Assignment {
    /// The decision being routed.
    pub decision: TriggerDecision,
    /// Connection name of the worker it was routed to.
    pub connection_name: String,
    /// Monotonic timestamp taken when the assignment was created.
    pub assigned_time: Instant,
}

impl Assignment {
    /// Returns the trigger number of the bound decision.
    #[must_use]
    pub fn trigger_number(&self) -> TriggerNumber {
        self.decision.trigger_number
    }
}

/// Mutable state of one trigger-record-builder worker.
///
/// Admission is governed by two thresholds with hysteresis: once the
/// in-flight count reaches `busy_threshold` the worker is busy and the
/// dispatcher skips it; it becomes eligible again only when the count
/// drops below `free_threshold`.
#[derive(Debug)]
pub struct WorkerLoad {
    connection_name: String,
    busy_threshold: usize,
    free_threshold: usize,
    is_busy: AtomicBool,
    in_error: AtomicBool,
    inflight: Mutex<VecDeque<Arc<Assignment>>>,
    latency_window: Mutex<VecDeque<(Instant, Duration)>>,
    metadata: Mutex<Value>,
}

impl WorkerLoad {
    /// Creates a worker whose busy and free thresholds coincide.
    #[must_use]
    pub fn with_capacity(connection_name: impl Into<String>, capacity: usize) -> Self {
        let connection_name = connection_name.into();
        Self {
            connection_name,
            busy_threshold: capacity,
            free_threshold: capacity,
            is_busy: AtomicBool::new(false),
            in_error: AtomicBool::new(false),
            inflight: Mutex::new(VecDeque::new()),
            latency_window: Mutex::new(VecDeque::new()),
            metadata: Mutex::new(Value::Null),
        }
    }

    /// Creates a worker with distinct busy and free thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThresholdsNotConsistent`] if `busy_threshold`
    /// is below `free_threshold`.
    pub fn new(
        connection_name: impl Into<String>,
        busy_threshold: usize,
        free_threshold: usize,
    ) -> Result<Self> {
        if busy_threshold < free_threshold {
            return Err(Error::ThresholdsNotConsistent {
                busy_threshold,
                free_threshold,
            });
        }

        let mut worker = Self::with_capacity(connection_name, busy_threshold);
        worker.free_threshold = free_threshold;
        Ok(worker)
    }

    /// Returns the worker's connection name.
    #[must_use]
    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    /// Returns the busy threshold.
    #[must_use]
    pub const fn busy_threshold(&self) -> usize {
        self.busy_threshold
    }

    /// Returns the free threshold.
    #[must_use]
    pub const fn free_threshold(&self) -> usize {
        self.free_threshold
    }

    /// Binds a decision to this worker, timestamped now.
    #[must_use]
    pub fn make_assignment(&self, decision: TriggerDecision) -> Arc<Assignment> {
        Arc::new(Assignment {
            decision,
            connection_name: self.connection_name.clone(),
            assigned_time: Instant::now(),
        })
    }

    /// Records an assignment as in flight.
    ///
    /// Sets the busy flag once the in-flight count reaches the busy
    /// threshold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSlotsAvailable`] if the worker is quarantined
    /// by its error flag.
    pub fn add_assignment(&self, assignment: Arc<Assignment>) -> Result<()> {
        let mut inflight = self
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if self.is_in_error() {
            return Err(Error::NoSlotsAvailable {
                trigger_number: assignment.trigger_number(),
                connection: self.connection_name.clone(),
            });
        }

        inflight.push_back(assignment);
        tracing::debug!(
            connection = %self.connection_name,
            inflight = inflight.len(),
            "assignment recorded"
        );

        if inflight.len() >= self.busy_threshold {
            self.is_busy.store(true, Ordering::Release);
        }

        Ok(())
    }

    /// Removes and returns the first in-flight assignment matching
    /// `trigger_number`, if any.
    ///
    /// Clears the busy flag when the remaining count is below the free
    /// threshold.
    pub fn extract_assignment(&self, trigger_number: TriggerNumber) -> Option<Arc<Assignment>> {
        let mut inflight = self
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let index = inflight
            .iter()
            .position(|a| a.trigger_number() == trigger_number);
        let extracted = index.and_then(|index| inflight.remove(index));

        if inflight.len() < self.free_threshold {
            self.is_busy.store(false, Ordering::Release);
        }

        extracted
    }

    /// Looks up an in-flight assignment without removing it.
    ///
    /// Does not mutate the busy state.
    pub fn get_assignment(&self, trigger_number: TriggerNumber) -> Option<Arc<Assignment>> {
        let inflight = self
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        inflight
            .iter()
            .find(|a| a.trigger_number() == trigger_number)
            .cloned()
    }

    /// Completes an assignment, recording its service time.
    ///
    /// Extracts the matching assignment, appends `(now, service_time)` to
    /// the latency window (evicting the oldest sample past the window
    /// capacity), and applies `metadata_fn` to the worker's metadata
    /// accumulator under its own lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssignmentNotFound`] if no in-flight assignment
    /// matches `trigger_number`.
    pub fn complete_assignment(
        &self,
        trigger_number: TriggerNumber,
        metadata_fn: Option<&MetadataFn>,
    ) -> Result<Duration> {
        let assignment =
            self.extract_assignment(trigger_number)
                .ok_or_else(|| Error::AssignmentNotFound {
                    trigger_number,
                    connection: self.connection_name.clone(),
                })?;

        let now = Instant::now();
        let service_time = now.duration_since(assignment.assigned_time);

        {
            let mut window = self
                .latency_window
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            window.push_back((now, service_time));
            if window.len() > LATENCY_WINDOW_CAPACITY {
                window.pop_front();
            }
        }

        if let Some(update) = metadata_fn {
            let mut metadata = self
                .metadata
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            update(&mut metadata);
        }

        Ok(service_time)
    }

    /// Returns whether the worker can accept a new assignment.
    ///
    /// Wait-free: reads only the busy and error atomics.
    #[must_use]
    pub fn has_slot(&self) -> bool {
        !self.is_busy.load(Ordering::Acquire) && !self.in_error.load(Ordering::Acquire)
    }

    /// Sets or clears the error quarantine flag.
    pub fn set_in_error(&self, flag: bool) {
        self.in_error.store(flag, Ordering::Release);
    }

    /// Returns whether the error quarantine flag is set.
    #[must_use]
    pub fn is_in_error(&self) -> bool {
        self.in_error.load(Ordering::Acquire)
    }

    /// Returns the mean service time of window samples completed at or
    /// after `since`.
    ///
    /// Scans newest to oldest and stops at the first sample older than
    /// `since`. Returns [`Duration::ZERO`] when no sample falls in range.
    #[must_use]
    pub fn average_latency(&self, since: Instant) -> Duration {
        let window = self
            .latency_window
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut sum = Duration::ZERO;
        let mut count = 0u32;
        for (completed_at, service_time) in window.iter().rev() {
            if *completed_at < since {
                break;
            }
            sum += *service_time;
            count += 1;
        }

        if count == 0 {
            Duration::ZERO
        } else {
            sum / count
        }
    }

    /// Returns the current in-flight count.
    #[must_use]
    pub fn inflight_len(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns a copy of the metadata accumulator.
    #[must_use]
    pub fn metadata(&self) -> Value {
        self.metadata
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
