//! Command-plane lifecycle of the Data Flow Orchestrator.
//!
//! The orchestrator moves through three states:
//!
//! ```text
//! idle --conf--> configured --start--> running
//!   ^                |  ^                 |
//!   +-----scrap------+  +------stop-------+
//! ```
//!
//! `conf` populates the worker registry and opens the token connection;
//! `start` captures the run number, registers the token callback, and
//! spawns the dispatcher; `stop` clears the run flag, lets the
//! dispatcher drain, and unregisters the callback; `scrap` closes the
//! token connection and clears the registry. Each command is idempotent
//! in its own state; out-of-order commands fail with
//! [`Error::InvalidTransition`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use daqflow_core::RunNumber;

use crate::config::DfoConfig;
use crate::counters::{DfoCounters, TelemetrySnapshot};
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::registry::WorkerRegistry;
use crate::source::DecisionSource;
use crate::token::TokenReceiver;
use crate::transport::Transport;
use crate::worker::MetadataFn;

/// State of one active run.
struct ActiveRun {
    run_number: RunNumber,
    run_flag: Arc<AtomicBool>,
    dispatcher: JoinHandle<()>,
}

/// The Data Flow Orchestrator component.
///
/// Routes trigger decisions from the injected [`DecisionSource`] to the
/// configured trigger-record builders over the injected [`Transport`],
/// and tracks per-worker load through the completion tokens the
/// transport delivers back.
pub struct DataFlowOrchestrator {
    transport: Arc<dyn Transport>,
    source: Arc<dyn DecisionSource>,
    metadata_fn: Option<Arc<MetadataFn>>,
    counters: Arc<DfoCounters>,
    slot_notify: Arc<Notify>,
    config: Option<DfoConfig>,
    registry: Option<Arc<WorkerRegistry>>,
    run: Option<ActiveRun>,
}

impl std::fmt::Debug for DataFlowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFlowOrchestrator")
            .field("state", &self.state_name())
            .finish_non_exhaustive()
    }
}

impl DataFlowOrchestrator {
    /// Creates an orchestrator over the injected collaborators.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, source: Arc<dyn DecisionSource>) -> Self {
        Self {
            transport,
            source,
            metadata_fn: None,
            counters: Arc::new(DfoCounters::new()),
            slot_notify: Arc::new(Notify::new()),
            config: None,
            registry: None,
            run: None,
        }
    }

    /// Installs the function applied to a worker's metadata accumulator
    /// on each completion.
    #[must_use]
    pub fn with_metadata_fn(mut self, metadata_fn: Arc<MetadataFn>) -> Self {
        self.metadata_fn = Some(metadata_fn);
        self
    }

    /// Configures the orchestrator: validates the option set, populates
    /// the worker registry, and begins listening for completion tokens.
    ///
    /// Reconfiguring while idle or already configured replaces the
    /// previous configuration.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidTransition`] while a run is active,
    /// with a configuration error for a malformed option set, or with a
    /// transport error if the token connection cannot be opened.
    pub async fn conf(&mut self, config: DfoConfig) -> Result<()> {
        if self.run.is_some() {
            return Err(Error::InvalidTransition {
                from: "running".into(),
                to: "configured".into(),
                reason: "stop the run before reconfiguring".into(),
            });
        }

        config.validate()?;
        let registry = WorkerRegistry::from_applications(&config.dataflow_applications)?;

        if let Some(previous) = self.config.take() {
            self.transport
                .stop_listening(&previous.token_connection)
                .await?;
        }
        self.transport
            .start_listening(&config.token_connection)
            .await?;

        tracing::info!(
            workers = registry.len(),
            token_connection = %config.token_connection,
            "orchestrator configured"
        );

        self.registry = Some(Arc::new(registry));
        self.config = Some(config);
        Ok(())
    }

    /// Starts a run: resets the counters, captures the run number,
    /// registers the token callback, and spawns the dispatcher.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidTransition`] when not configured or
    /// already running, or with a transport error if the callback cannot
    /// be registered.
    pub async fn start(&mut self, run_number: RunNumber) -> Result<()> {
        let (Some(config), Some(registry)) = (self.config.as_ref(), self.registry.as_ref())
        else {
            return Err(Error::InvalidTransition {
                from: "idle".into(),
                to: "running".into(),
                reason: "configure before starting".into(),
            });
        };
        if self.run.is_some() {
            return Err(Error::InvalidTransition {
                from: "running".into(),
                to: "running".into(),
                reason: "a run is already active".into(),
            });
        }

        self.counters.reset();

        let mut receiver = TokenReceiver::new(
            Arc::clone(registry),
            run_number,
            Arc::clone(&self.counters),
            Arc::clone(&self.slot_notify),
        );
        if let Some(metadata_fn) = &self.metadata_fn {
            receiver = receiver.with_metadata_fn(Arc::clone(metadata_fn));
        }
        self.transport
            .register_callback(&config.token_connection, Arc::new(receiver).into_callback())
            .await?;

        let run_flag = Arc::new(AtomicBool::new(true));
        let dispatcher = Dispatcher::new(
            Arc::clone(registry),
            Arc::clone(&self.source),
            Arc::clone(&self.transport),
            config,
            Arc::clone(&run_flag),
            Arc::clone(&self.slot_notify),
            Arc::clone(&self.counters),
        );

        tracing::info!(run = %run_number, "starting run");
        self.run = Some(ActiveRun {
            run_number,
            run_flag,
            dispatcher: tokio::spawn(dispatcher.run()),
        });
        Ok(())
    }

    /// Stops the active run: clears the run flag, waits for the
    /// dispatcher to drain and exit, and unregisters the token callback.
    ///
    /// A no-op when no run is active.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the callback cannot be removed.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(run) = self.run.take() else {
            tracing::debug!("stop with no active run");
            return Ok(());
        };

        run.run_flag.store(false, Ordering::Release);
        self.slot_notify.notify_waiters();
        if let Err(error) = run.dispatcher.await {
            tracing::error!(error = %error, "dispatcher task failed");
        }

        if let Some(config) = self.config.as_ref() {
            self.transport
                .clear_callback(&config.token_connection)
                .await?;
        }

        tracing::info!(run = %run.run_number, "run stopped");
        Ok(())
    }

    /// Tears down the configuration: stops listening on the token
    /// connection and clears the registry.
    ///
    /// A no-op when not configured.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidTransition`] while a run is active, or
    /// with a transport error if the connection cannot be closed.
    pub async fn scrap(&mut self) -> Result<()> {
        if self.run.is_some() {
            return Err(Error::InvalidTransition {
                from: "running".into(),
                to: "idle".into(),
                reason: "stop the run before scrapping".into(),
            });
        }

        if let Some(config) = self.config.take() {
            self.transport
                .stop_listening(&config.token_connection)
                .await?;
            self.registry = None;
            tracing::info!("orchestrator scrapped");
        }
        Ok(())
    }

    /// Takes a telemetry snapshot, resetting every counter.
    #[must_use]
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.counters.snapshot()
    }

    /// Returns whether a run is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    /// Returns the active run number, if any.
    #[must_use]
    pub fn run_number(&self) -> Option<RunNumber> {
        self.run.as_ref().map(|run| run.run_number)
    }

    /// Returns the configured worker registry, if any.
    #[must_use]
    pub fn registry(&self) -> Option<&Arc<WorkerRegistry>> {
        self.registry.as_ref()
    }

    fn state_name(&self) -> &'static str {
        if self.run.is_some() {
            "running"
        } else if self.config.is_some() {
            "configured"
        } else {
            "idle"
        }
    }
}
