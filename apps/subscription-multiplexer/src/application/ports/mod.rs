//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `TransportPort`: Interface for forwarding requests to the venue transport
//! - `ReplySink`: Interface for delivering replies and lifecycle events to callers
//!
//! ## Driver Ports (Inbound)
//!
//! - `TransportEventSource`: Async stream of replies and lifecycle events
//!   emitted by the transport

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::message::{InboundMessage, OutboundMessage};

/// Downstream transport connected to the venue.
///
/// Implementations must not call back into the multiplexer synchronously
/// while holding their own locks; the multiplexer never holds its ledger lock
/// across this call.
#[cfg_attr(test, mockall::automock)]
pub trait TransportPort: Send + Sync {
    /// Push a message towards the venue.
    fn send(&self, message: InboundMessage);
}

/// Upstream delivery of replies and lifecycle events to callers.
#[cfg_attr(test, mockall::automock)]
pub trait ReplySink: Send + Sync {
    /// Deliver one outbound message.
    fn deliver(&self, message: OutboundMessage);
}

/// Asynchronous source of transport events.
#[async_trait]
pub trait TransportEventSource: Send {
    /// Wait for the next event; `None` once the transport has shut down.
    async fn next_event(&mut self) -> Option<OutboundMessage>;
}

#[async_trait]
impl TransportEventSource for mpsc::Receiver<OutboundMessage> {
    async fn next_event(&mut self) -> Option<OutboundMessage> {
        self.recv().await
    }
}

#[async_trait]
impl TransportEventSource for mpsc::UnboundedReceiver<OutboundMessage> {
    async fn next_event(&mut self) -> Option<OutboundMessage> {
        self.recv().await
    }
}
