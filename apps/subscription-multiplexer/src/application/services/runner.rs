//! Transport Event Loop
//!
//! Drives the multiplexer's outbound path from an asynchronous transport
//! event source until the source closes or shutdown is requested.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::SubscriptionMultiplexer;
use crate::application::ports::TransportEventSource;

/// Async driver for [`SubscriptionMultiplexer::handle_transport_message`].
#[derive(Debug, Clone)]
pub struct MultiplexerService {
    multiplexer: Arc<SubscriptionMultiplexer>,
    cancel: CancellationToken,
}

impl MultiplexerService {
    /// Create a service stopping when `cancel` fires.
    #[must_use]
    pub const fn new(multiplexer: Arc<SubscriptionMultiplexer>, cancel: CancellationToken) -> Self {
        Self {
            multiplexer,
            cancel,
        }
    }

    /// The driven multiplexer.
    #[must_use]
    pub const fn multiplexer(&self) -> &Arc<SubscriptionMultiplexer> {
        &self.multiplexer
    }

    /// Process transport events until the source ends or the service is cancelled.
    ///
    /// Returns the number of events processed.
    pub async fn run<S>(&self, mut source: S) -> u64
    where
        S: TransportEventSource,
    {
        let mut processed = 0;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!(processed, "Multiplexer service cancelled");
                    break;
                }
                event = source.next_event() => {
                    let Some(message) = event else {
                        tracing::info!(processed, "Transport event source closed");
                        break;
                    };
                    processed += 1;
                    self.multiplexer.handle_transport_message(message);
                }
            }
        }

        processed
    }
}
