//! Registry of configured trigger-record-builder workers.
//!
//! Membership is frozen between configure and scrap: the registry is
//! built once from the configured application list and after that only
//! the [`WorkerLoad`]s themselves mutate, in place. Iteration order is
//! the configuration order, which makes round-robin selection
//! deterministic.

use std::collections::HashMap;

use crate::config::TrbConnection;
use crate::error::Result;
use crate::worker::WorkerLoad;

/// Fixed map of connection name to [`WorkerLoad`].
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    /// Connection names in configuration order.
    order: Vec<String>,
    workers: HashMap<String, WorkerLoad>,
}

impl WorkerRegistry {
    /// Builds a registry from the configured application list.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::ThresholdsNotConsistent`] if any
    /// application declares a busy threshold below its free threshold,
    /// or a configuration error for a malformed threshold form.
    pub fn from_applications(applications: &[TrbConnection]) -> Result<Self> {
        let mut order = Vec::with_capacity(applications.len());
        let mut workers = HashMap::with_capacity(applications.len());

        for app in applications {
            let worker = app.build_worker()?;
            order.push(app.decision_connection.clone());
            workers.insert(app.decision_connection.clone(), worker);
        }

        Ok(Self { order, workers })
    }

    /// Returns the worker registered under `connection`, if any.
    #[must_use]
    pub fn get(&self, connection: &str) -> Option<&WorkerLoad> {
        self.workers.get(connection)
    }

    /// Returns the worker at `index` in configuration order.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds; callers index via
    /// [`SelectionCursor`], which stays within the registry size.
    #[must_use]
    pub fn nth(&self, index: usize) -> &WorkerLoad {
        &self.workers[&self.order[index]]
    }

    /// Returns the number of registered workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns whether any worker can accept a new assignment.
    ///
    /// O(n) over wait-free per-worker checks.
    #[must_use]
    pub fn has_any_slot(&self) -> bool {
        self.order
            .iter()
            .any(|name| self.workers[name].has_slot())
    }

    /// Iterates the workers in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &WorkerLoad> {
        self.order.iter().map(move |name| &self.workers[name])
    }
}

/// Round-robin position over a [`WorkerRegistry`].
///
/// A plain integer index into the registry's stable configuration order,
/// owned exclusively by the dispatcher. It survives across dispatch
/// calls so consecutive selections continue where the last one stopped.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectionCursor {
    next: usize,
}

impl SelectionCursor {
    /// Creates a cursor whose first selection probes the first worker.
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Returns the next index to probe and advances the cursor.
    ///
    /// # Panics
    ///
    /// Panics if `len` is zero; the dispatcher never selects against an
    /// empty registry.
    pub fn advance(&mut self, len: usize) -> usize {
        assert!(len > 0, "cannot advance a cursor over an empty registry");
        let index = self.next % len;
        self.next = (index + 1) % len;
        index
    }
}
