//! Wire messages exchanged with the trigger system and the TRB workers.
//!
//! The orchestrator inspects only the identifying fields of a trigger
//! decision; everything else the trigger system attaches (timestamps,
//! trigger type, readout components, ...) is ferried to the worker
//! untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use daqflow_core::{RunNumber, TriggerNumber};

/// A trigger decision produced by the upstream trigger system.
///
/// Identifies one candidate event to be assembled into a trigger record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerDecision {
    /// Unique trigger number, monotonically increasing within a run.
    pub trigger_number: TriggerNumber,
    /// Run this decision belongs to.
    pub run_number: RunNumber,
    /// Every other field the trigger system attached, ferried untouched.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl TriggerDecision {
    /// Creates a decision with an empty ferried payload.
    #[must_use]
    pub fn new(trigger_number: TriggerNumber, run_number: RunNumber) -> Self {
        Self {
            trigger_number,
            run_number,
            payload: Map::new(),
        }
    }

    /// Attaches a ferried payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Serializes the decision to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes a decision from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A completion token returned by a TRB worker.
///
/// Acknowledges that the worker named by `decision_destination` has
/// finished building the record for `trigger_number`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionToken {
    /// Run the completed assignment belonged to.
    pub run_number: RunNumber,
    /// Trigger number of the completed assignment.
    pub trigger_number: TriggerNumber,
    /// Connection name of the worker that completed it.
    pub decision_destination: String,
}

impl CompletionToken {
    /// Creates a completion token.
    #[must_use]
    pub fn new(
        run_number: RunNumber,
        trigger_number: TriggerNumber,
        decision_destination: impl Into<String>,
    ) -> Self {
        Self {
            run_number,
            trigger_number,
            decision_destination: decision_destination.into(),
        }
    }

    /// Serializes the token to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes a token from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
