//! Network transport abstraction.
//!
//! This module provides:
//!
//! - [`Transport`]: Trait for sending serialized decisions and receiving
//!   completion tokens
//! - [`memory::InMemoryTransport`]: In-memory implementation for testing
//!
//! ## Design Principles
//!
//! - **Backend agnostic**: the same interface covers message-queue,
//!   socket, or in-process transports
//! - **Injected, not global**: the orchestrator receives its transport at
//!   construction; no process-wide registry is consulted
//! - **Opaque payloads**: the transport carries bytes; serialization is
//!   the caller's concern

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Callback invoked with the raw bytes of each received message.
pub type TokenCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Transport for dispatching decisions and receiving completion tokens.
///
/// ## Thread Safety
///
/// All methods are `Send + Sync`. Callbacks registered through
/// [`Transport::register_callback`] may be invoked concurrently from any
/// transport thread and must not block.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Begins listening on `connection` for inbound messages.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the connection cannot be opened.
    async fn start_listening(&self, connection: &str) -> Result<()>;

    /// Stops listening on `connection`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the connection cannot be closed.
    async fn stop_listening(&self, connection: &str) -> Result<()>;

    /// Registers the callback invoked for each message received on
    /// `connection`. Replaces any previous callback.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the callback cannot be installed.
    async fn register_callback(&self, connection: &str, callback: TokenCallback) -> Result<()>;

    /// Removes the callback registered on `connection`, if any.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the callback cannot be removed.
    async fn clear_callback(&self, connection: &str) -> Result<()>;

    /// Sends `payload` to `connection`, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the send fails or times out.
    async fn send_to(&self, connection: &str, payload: &[u8], timeout: Duration) -> Result<()>;
}
