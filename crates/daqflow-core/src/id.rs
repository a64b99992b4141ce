//! Strongly-typed identifiers for Daqflow entities.
//!
//! Unlike randomly generated identifiers, trigger and run numbers are
//! assigned by the upstream trigger system: trigger numbers increase
//! monotonically within a run, and run numbers delimit bounded
//! data-taking epochs. The newtypes here exist so the two cannot be
//! mixed up at compile time.
//!
//! # Example
//!
//! ```rust
//! use daqflow_core::id::{RunNumber, TriggerNumber};
//!
//! let run = RunNumber::new(42);
//! let trigger = TriggerNumber::new(1_000_001);
//!
//! // IDs are different types - this won't compile:
//! // let wrong: RunNumber = trigger;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A unique trigger number.
///
/// Assigned by the upstream trigger system; unique and monotonically
/// increasing within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerNumber(u64);

impl TriggerNumber {
    /// Creates a trigger number from its raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TriggerNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TriggerNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromStr for TriggerNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u64>().map(Self).map_err(|e| Error::InvalidId {
            message: format!("invalid trigger number '{s}': {e}"),
        })
    }
}

/// A run number identifying one bounded data-taking epoch.
///
/// All trigger decisions and completion tokens carry the run number of
/// the epoch they belong to; messages from other runs are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunNumber(u32);

impl RunNumber {
    /// Creates a run number from its raw value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RunNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for RunNumber {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl FromStr for RunNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u32>().map(Self).map_err(|e| Error::InvalidId {
            message: format!("invalid run number '{s}': {e}"),
        })
    }
}
