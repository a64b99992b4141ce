//! # daqflow-dfo
//!
//! Data Flow Orchestrator for the Daqflow data-acquisition pipeline.
//!
//! The orchestrator sits between the trigger system and a pool of
//! trigger-record-builder (TRB) workers. Upstream, the trigger emits a
//! stream of trigger decisions; downstream, long-running TRB workers
//! assemble the corresponding event records and acknowledge each one with
//! a completion token. This crate implements the piece in the middle:
//!
//! - **Load-aware routing**: each worker's in-flight assignments are
//!   tracked with busy/free hysteresis so overloaded workers are skipped
//! - **Back-pressure**: when every worker is busy, dispatch parks on a
//!   slot-available signal instead of queueing blindly
//! - **Soft quarantine**: a worker whose sends exhaust their retries is
//!   flagged in-error and skipped until its next successful completion
//!
//! ## Core Concepts
//!
//! - **Trigger decision**: an upstream message identifying one candidate
//!   event, tagged by trigger number and run number
//! - **Assignment**: a binding of a trigger decision to a specific worker,
//!   timestamped at dispatch
//! - **Completion token**: a downstream acknowledgement that a worker has
//!   finished one assignment
//!
//! ## Collaborators
//!
//! The network edge and the decision input queue are injected: the
//! [`transport::Transport`] trait carries serialized decisions to workers
//! and delivers completion tokens back, and the [`source::DecisionSource`]
//! trait yields decisions to the dispatcher. In-memory implementations of
//! both are provided for hosts and tests.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use daqflow_core::RunNumber;
//! use daqflow_dfo::config::{DfoConfig, TrbConnection};
//! use daqflow_dfo::error::Result;
//! use daqflow_dfo::orchestrator::DataFlowOrchestrator;
//! use daqflow_dfo::source::ChannelDecisionSource;
//! use daqflow_dfo::transport::memory::InMemoryTransport;
//!
//! # async fn run() -> Result<()> {
//! let transport = Arc::new(InMemoryTransport::new());
//! let (source, _sender) = ChannelDecisionSource::with_capacity(1024);
//!
//! let config = DfoConfig::new("trb_tokens")
//!     .with_application(TrbConnection::with_capacity("trb-01", 10))
//!     .with_application(TrbConnection::with_capacity("trb-02", 10));
//!
//! let mut dfo = DataFlowOrchestrator::new(transport, Arc::new(source));
//! dfo.conf(config).await?;
//! dfo.start(RunNumber::new(1)).await?;
//! // ... run until end of data taking
//! dfo.stop().await?;
//! dfo.scrap().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod counters;
pub mod decision;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod source;
pub mod token;
pub mod transport;
pub mod worker;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{DfoConfig, TrbConnection};
    pub use crate::counters::{DfoCounters, TelemetrySnapshot};
    pub use crate::decision::{CompletionToken, TriggerDecision};
    pub use crate::error::{Error, Result};
    pub use crate::metrics::DfoMetrics;
    pub use crate::orchestrator::DataFlowOrchestrator;
    pub use crate::registry::{SelectionCursor, WorkerRegistry};
    pub use crate::source::{ChannelDecisionSource, DecisionSource};
    pub use crate::transport::{memory::InMemoryTransport, TokenCallback, Transport};
    pub use crate::worker::{Assignment, WorkerLoad};
}
