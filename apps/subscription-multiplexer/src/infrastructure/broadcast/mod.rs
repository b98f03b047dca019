//! Reply Broadcast Adapter
//!
//! Implements caller-side delivery using a tokio broadcast channel for
//! fan-out to any number of receivers.
//!
//! # Architecture
//!
//! The `ReplyHub` is the multiplexer's [`ReplySink`]. Every outbound message
//! (per-caller subscription replies and connection events) is broadcast; each
//! caller either consumes the raw channel or narrows it to its own requests
//! with [`ReplyHub::replies_for`].

use std::sync::Arc;

use futures::Stream;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::application::ports::ReplySink;
use crate::domain::message::{OutboundMessage, SubscriptionMessage, TransactionId};
use crate::infrastructure::config::ChannelSettings;

/// Configuration for the reply channel.
#[derive(Debug, Clone, Copy)]
pub struct ReplyHubConfig {
    /// Channel capacity; slow receivers lag once it is exceeded.
    pub capacity: usize,
}

impl Default for ReplyHubConfig {
    fn default() -> Self {
        Self { capacity: 1_024 }
    }
}

impl From<ChannelSettings> for ReplyHubConfig {
    fn from(settings: ChannelSettings) -> Self {
        Self {
            capacity: settings.replies_capacity,
        }
    }
}

/// Broadcast hub for outbound messages.
///
/// # Example
///
/// ```rust
/// use subscription_multiplexer::infrastructure::broadcast::{ReplyHub, ReplyHubConfig};
///
/// let hub = ReplyHub::new(ReplyHubConfig::default());
///
/// // Get a receiver for every outbound message
/// let mut rx = hub.subscribe();
/// assert_eq!(hub.receiver_count(), 1);
/// ```
#[derive(Debug)]
pub struct ReplyHub {
    tx: broadcast::Sender<OutboundMessage>,
}

/// Shared reply hub.
pub type SharedReplyHub = Arc<ReplyHub>;

impl ReplyHub {
    /// Create a new hub with the given configuration.
    #[must_use]
    pub fn new(config: ReplyHubConfig) -> Self {
        Self {
            tx: broadcast::channel(config.capacity.max(1)).0,
        }
    }

    /// Create a new hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(ReplyHubConfig::default())
    }

    /// Send a message to all receivers.
    ///
    /// Returns the number of receivers, or `None` if there are none.
    #[must_use]
    pub fn send(&self, message: OutboundMessage) -> Option<usize> {
        self.tx.send(message).ok()
    }

    /// Get a new receiver for every outbound message.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.tx.subscribe()
    }

    /// Get the number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Stream of subscription replies answering `transaction_id`.
    ///
    /// Lagged messages are skipped with a warning.
    pub fn replies_for(
        &self,
        transaction_id: TransactionId,
    ) -> impl Stream<Item = SubscriptionMessage> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(move |item| {
            let reply = match item {
                Ok(OutboundMessage::Subscription(reply))
                    if reply.original_transaction_id == Some(transaction_id) =>
                {
                    Some(reply)
                }
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(transaction_id, skipped, "Reply receiver lagged");
                    None
                }
            };
            futures::future::ready(reply)
        })
    }
}

impl ReplySink for ReplyHub {
    fn deliver(&self, message: OutboundMessage) {
        if self.send(message).is_none() {
            tracing::trace!("No reply receivers; message dropped");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
