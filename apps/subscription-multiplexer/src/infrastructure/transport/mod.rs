//! Transport Channel Adapter
//!
//! [`TransportPort`] implementation that hands inbound messages to the task
//! owning the venue connection over a bounded mpsc channel. The multiplexer
//! calls `send` from synchronous code, so a full or closed channel drops the
//! message (logged and counted) instead of blocking the caller.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::application::ports::TransportPort;
use crate::domain::message::InboundMessage;
use crate::infrastructure::config::ChannelSettings;
use crate::infrastructure::metrics;

/// Errors raised by the transport channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Channel is at capacity.
    #[error("transport channel is full")]
    ChannelFull,
    /// The transport task has gone away.
    #[error("transport channel is closed")]
    ChannelClosed,
}

/// Bounded channel into the transport task.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<InboundMessage>,
}

impl ChannelTransport {
    /// Create the adapter and the receiver the transport task consumes.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<InboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Create the adapter sized from channel settings.
    #[must_use]
    pub fn from_settings(settings: &ChannelSettings) -> (Self, mpsc::Receiver<InboundMessage>) {
        Self::new(settings.transport_capacity)
    }

    /// Try to enqueue a message for the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is full or the transport task has exited.
    pub fn try_send(&self, message: InboundMessage) -> Result<(), TransportError> {
        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::ChannelFull,
            TrySendError::Closed(_) => TransportError::ChannelClosed,
        })
    }
}

impl TransportPort for ChannelTransport {
    fn send(&self, message: InboundMessage) {
        if let Err(e) = self.try_send(message) {
            metrics::record_transport_drop();
            tracing::error!(error = %e, "Failed to forward message to transport");
        }
    }
}
