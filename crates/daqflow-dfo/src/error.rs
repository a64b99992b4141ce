//! Error types for the orchestration domain.

use daqflow_core::TriggerNumber;

/// The result type used throughout `daqflow-dfo`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in orchestration operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A worker was configured with a busy threshold below its free threshold.
    #[error(
        "inconsistent worker thresholds: busy threshold {busy_threshold} < free threshold {free_threshold}"
    )]
    ThresholdsNotConsistent {
        /// The configured busy threshold.
        busy_threshold: usize,
        /// The configured free threshold.
        free_threshold: usize,
    },

    /// An assignment was offered to a worker that cannot accept it.
    #[error("no slots available on {connection} for trigger {trigger_number}")]
    NoSlotsAvailable {
        /// The trigger number of the rejected assignment.
        trigger_number: TriggerNumber,
        /// The worker that rejected it.
        connection: String,
    },

    /// A completion token arrived for an assignment the worker does not hold.
    #[error("no assignment for trigger {trigger_number} on {connection}")]
    AssignmentNotFound {
        /// The trigger number that was looked up.
        trigger_number: TriggerNumber,
        /// The worker that was searched.
        connection: String,
    },

    /// A message referenced a worker that is not in the registry.
    #[error("unknown worker: {connection}")]
    UnknownWorker {
        /// The connection name that was looked up.
        connection: String,
    },

    /// A transport operation failed.
    #[error("transport error on {connection}: {message}")]
    Transport {
        /// The connection the operation targeted.
        connection: String,
        /// Description of the failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An invalid command-plane transition was attempted.
    #[error("invalid state transition: {from} -> {to} ({reason})")]
    InvalidTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
        /// The reason the transition is invalid.
        reason: String,
    },

    /// The configuration is invalid.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },
}

impl Error {
    /// Creates a new transport error.
    #[must_use]
    pub fn transport(connection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            connection: connection.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new transport error with a source cause.
    #[must_use]
    pub fn transport_with_source(
        connection: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            connection: connection.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}
