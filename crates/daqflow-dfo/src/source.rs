//! Decision intake abstraction.
//!
//! The dispatcher pulls trigger decisions through the [`DecisionSource`]
//! trait; the host decides what backs it (an in-process queue fed by the
//! trigger path, a network receiver, a replay file). A channel-backed
//! implementation is provided for hosts and tests.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::decision::TriggerDecision;

/// Source of trigger decisions for the dispatcher.
///
/// ## Thread Safety
///
/// All methods are `Send + Sync`; only the dispatcher task pulls, but
/// the source may be shared for observability.
#[async_trait]
pub trait DecisionSource: Send + Sync {
    /// Waits up to `timeout` for the next decision.
    ///
    /// Returns `None` on timeout or when the source is exhausted; a
    /// timeout is an expected outcome, not an error.
    async fn recv(&self, timeout: Duration) -> Option<TriggerDecision>;

    /// Pulls the next decision without waiting.
    ///
    /// Used by the shutdown drain.
    async fn try_recv(&self) -> Option<TriggerDecision>;
}

/// Decision source backed by a bounded tokio channel.
#[derive(Debug)]
pub struct ChannelDecisionSource {
    receiver: tokio::sync::Mutex<mpsc::Receiver<TriggerDecision>>,
}

impl ChannelDecisionSource {
    /// Creates a channel-backed source and the sender that feeds it.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Sender<TriggerDecision>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self {
                receiver: tokio::sync::Mutex::new(receiver),
            },
            sender,
        )
    }
}

#[async_trait]
impl DecisionSource for ChannelDecisionSource {
    async fn recv(&self, timeout: Duration) -> Option<TriggerDecision> {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(Some(decision)) => Some(decision),
            Ok(None) => {
                // Sender side closed; behave like an idle source so the
                // caller keeps its bounded polling cadence.
                drop(receiver);
                tokio::time::sleep(timeout).await;
                None
            }
            Err(_) => None,
        }
    }

    async fn try_recv(&self) -> Option<TriggerDecision> {
        let mut receiver = self.receiver.lock().await;
        receiver.try_recv().ok()
    }
}
