//! In-memory transport implementation for testing.
//!
//! This module provides [`InMemoryTransport`], a simple in-memory
//! implementation of the [`Transport`] trait suitable for testing and
//! development.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: no real network, no persistence
//! - **Single-process only**: messages are not visible across process
//!   boundaries
//! - **Timeouts are ignored**: sends complete (or fail as scripted)
//!   immediately

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::decision::CompletionToken;
use crate::error::{Error, Result};

use super::{TokenCallback, Transport};

/// Converts a lock poison error to a transport error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::transport("memory", "transport lock poisoned")
}

/// In-memory transport for testing.
///
/// Records every sent payload per connection, supports scripted send
/// failures, and can deliver completion tokens to registered callbacks.
///
/// ## Example
///
/// ```rust
/// use daqflow_dfo::transport::memory::InMemoryTransport;
///
/// let transport = InMemoryTransport::new();
/// transport.fail_next_sends("trb-01", 2);
/// // The next two sends to trb-01 fail, the third succeeds.
/// ```
#[derive(Default)]
pub struct InMemoryTransport {
    listening: RwLock<HashSet<String>>,
    callbacks: RwLock<HashMap<String, TokenCallback>>,
    sent: RwLock<HashMap<String, Vec<Vec<u8>>>>,
    scripted_failures: RwLock<HashMap<String, u32>>,
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransport").finish_non_exhaustive()
    }
}

impl InMemoryTransport {
    /// Creates an empty in-memory transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next `count` sends to `connection` to fail.
    ///
    /// Counts are cumulative with any previously scripted failures.
    pub fn fail_next_sends(&self, connection: &str, count: u32) {
        let mut failures = self
            .scripted_failures
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *failures.entry(connection.to_string()).or_insert(0) += count;
    }

    /// Returns the payloads sent to `connection`, in send order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn sent_to(&self, connection: &str) -> Result<Vec<Vec<u8>>> {
        let sent = self.sent.read().map_err(poison_err)?;
        Ok(sent.get(connection).cloned().unwrap_or_default())
    }

    /// Returns how many payloads were sent to `connection`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn sent_count(&self, connection: &str) -> Result<usize> {
        Ok(self.sent_to(connection)?.len())
    }

    /// Returns the total number of payloads sent on any connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn total_sent(&self) -> Result<usize> {
        let sent = self.sent.read().map_err(poison_err)?;
        Ok(sent.values().map(Vec::len).sum())
    }

    /// Returns whether `connection` is currently being listened on.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_listening(&self, connection: &str) -> Result<bool> {
        let listening = self.listening.read().map_err(poison_err)?;
        Ok(listening.contains(connection))
    }

    /// Returns whether a callback is registered on `connection`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn has_callback(&self, connection: &str) -> Result<bool> {
        let callbacks = self.callbacks.read().map_err(poison_err)?;
        Ok(callbacks.contains_key(connection))
    }

    /// Serializes `token` and delivers it to the callback registered on
    /// `connection`, as a real transport would on message arrival.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if no callback is registered, or a
    /// serialization error if the token cannot be encoded.
    pub fn deliver_token(&self, connection: &str, token: &CompletionToken) -> Result<()> {
        let payload = token
            .to_json()
            .map_err(|e| Error::serialization(format!("completion token encode: {e}")))?;

        let callback = {
            let callbacks = self.callbacks.read().map_err(poison_err)?;
            callbacks.get(connection).cloned()
        };

        let Some(callback) = callback else {
            return Err(Error::transport(
                connection,
                "no callback registered for token delivery",
            ));
        };

        callback(payload.as_bytes());
        Ok(())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn start_listening(&self, connection: &str) -> Result<()> {
        let mut listening = self.listening.write().map_err(poison_err)?;
        listening.insert(connection.to_string());
        Ok(())
    }

    async fn stop_listening(&self, connection: &str) -> Result<()> {
        let mut listening = self.listening.write().map_err(poison_err)?;
        listening.remove(connection);
        Ok(())
    }

    async fn register_callback(&self, connection: &str, callback: TokenCallback) -> Result<()> {
        let mut callbacks = self.callbacks.write().map_err(poison_err)?;
        callbacks.insert(connection.to_string(), callback);
        Ok(())
    }

    async fn clear_callback(&self, connection: &str) -> Result<()> {
        let mut callbacks = self.callbacks.write().map_err(poison_err)?;
        callbacks.remove(connection);
        Ok(())
    }

    async fn send_to(&self, connection: &str, payload: &[u8], _timeout: Duration) -> Result<()> {
        {
            let mut failures = self
                .scripted_failures
                .write()
                .map_err(poison_err)?;
            if let Some(remaining) = failures.get_mut(connection) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::transport(connection, "scripted send failure"));
                }
            }
        }

        let mut sent = self.sent.write().map_err(poison_err)?;
        sent.entry(connection.to_string())
            .or_default()
            .push(payload.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daqflow_core::{RunNumber, TriggerNumber};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn send_records_payload_in_order() -> Result<()> {
        let transport = InMemoryTransport::new();

        transport
            .send_to("trb-01", b"first", Duration::from_millis(10))
            .await?;
        transport
            .send_to("trb-01", b"second", Duration::from_millis(10))
            .await?;

        let sent = transport.sent_to("trb-01")?;
        assert_eq!(sent, vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(transport.sent_count("trb-02")?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn scripted_failures_exhaust_then_succeed() -> Result<()> {
        let transport = InMemoryTransport::new();
        transport.fail_next_sends("trb-01", 2);

        let timeout = Duration::from_millis(10);
        assert!(transport.send_to("trb-01", b"a", timeout).await.is_err());
        assert!(transport.send_to("trb-01", b"b", timeout).await.is_err());
        transport.send_to("trb-01", b"c", timeout).await?;

        assert_eq!(transport.sent_count("trb-01")?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn failures_do_not_leak_across_connections() -> Result<()> {
        let transport = InMemoryTransport::new();
        transport.fail_next_sends("trb-01", 1);

        transport
            .send_to("trb-02", b"ok", Duration::from_millis(10))
            .await?;
        assert_eq!(transport.sent_count("trb-02")?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn listening_lifecycle() -> Result<()> {
        let transport = InMemoryTransport::new();
        assert!(!transport.is_listening("tokens")?);

        transport.start_listening("tokens").await?;
        assert!(transport.is_listening("tokens")?);

        transport.stop_listening("tokens").await?;
        assert!(!transport.is_listening("tokens")?);
        Ok(())
    }

    #[tokio::test]
    async fn deliver_token_invokes_registered_callback() -> Result<()> {
        let transport = InMemoryTransport::new();
        let received = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&received);
        transport
            .register_callback(
                "tokens",
                Arc::new(move |payload: &[u8]| {
                    let token = CompletionToken::from_json(
                        std::str::from_utf8(payload).expect("utf8"),
                    )
                    .expect("token");
                    assert_eq!(token.decision_destination, "trb-01");
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await?;

        let token = CompletionToken::new(RunNumber::new(1), TriggerNumber::new(3), "trb-01");
        transport.deliver_token("tokens", &token)?;
        assert_eq!(received.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn deliver_token_without_callback_fails() {
        let transport = InMemoryTransport::new();
        let token = CompletionToken::new(RunNumber::new(1), TriggerNumber::new(3), "trb-01");
        assert!(transport.deliver_token("tokens", &token).is_err());
    }

    #[tokio::test]
    async fn clear_callback_removes_registration() -> Result<()> {
        let transport = InMemoryTransport::new();
        transport
            .register_callback("tokens", Arc::new(|_: &[u8]| {}))
            .await?;
        assert!(transport.has_callback("tokens")?);

        transport.clear_callback("tokens").await?;
        assert!(!transport.has_callback("tokens")?);
        Ok(())
    }
}
