//! # daqflow-core
//!
//! Core types and shared infrastructure for the Daqflow data-acquisition
//! pipeline.
//!
//! This crate provides the foundation used by every Daqflow component:
//!
//! - **Strongly-typed identifiers**: trigger and run numbers that cannot be
//!   mixed up at compile time
//! - **Shared error types**: structured errors with context for debugging
//! - **Observability**: logging initialization and span constructors

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod observability;

pub use error::{Error, Result};
pub use id::{RunNumber, TriggerNumber};
