//! Observability infrastructure for Daqflow.
//!
//! Logging initialization plus the span constructor for the dispatch
//! path. Trigger number and worker connection are the two fields every
//! dispatch investigation greps for, so [`dispatch_span`] carries them
//! uniformly; events emitted inside it inherit both.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::EnvFilter;

use crate::TriggerNumber;

static INIT: Once = Once::new();

/// Filter applied when `RUST_LOG` is unset.
///
/// Per-decision events in the dispatch path are emitted at `debug` and
/// stay opt-in; everything else logs at `info`.
pub const DEFAULT_FILTER: &str = "info";

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup; later calls are no-ops. Thread ids
/// are always recorded: completion tokens arrive on transport threads,
/// and interleaving them with the dispatcher is the first thing a
/// dispatch investigation needs. JSON output flattens event fields to
/// the top level so log aggregators can index `trigger` and
/// `connection` directly.
///
/// # Environment Variables
///
/// - `RUST_LOG`: overrides [`DEFAULT_FILTER`] (e.g. `daqflow_dfo=debug`)
///
/// # Example
///
/// ```rust
/// use daqflow_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_ids(true);

        match format {
            LogFormat::Json => builder.json().flatten_event(true).init(),
            LogFormat::Pretty => builder.pretty().init(),
        }
    });
}

/// Creates a span tying one trigger decision to the worker handling it.
///
/// Used around the send-retry loop and completion-token processing so
/// the retries, warnings, and state changes for one assignment share
/// one context.
///
/// # Example
///
/// ```rust
/// use daqflow_core::TriggerNumber;
/// use daqflow_core::observability::dispatch_span;
///
/// let span = dispatch_span("send", TriggerNumber::new(42), "trb-01");
/// let _guard = span.enter();
/// // ... work on this assignment
/// ```
#[must_use]
pub fn dispatch_span(operation: &str, trigger: TriggerNumber, connection: &str) -> Span {
    tracing::info_span!(
        "dispatch",
        op = operation,
        trigger = trigger.value(),
        connection = connection,
    )
}
