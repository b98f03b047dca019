//! Shared fixtures for multiplexer integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use subscription_multiplexer::{
    CandleSeries, InboundMessage, IncrementalIdGenerator, MultiplexerSettings, OutboundMessage,
    ReplySink, SecurityId, StreamSpec, SubscriptionMessage, SubscriptionMultiplexer,
    TransactionId, TransactionIdGenerator, TransportPort,
};

/// Transport that records everything it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<InboundMessage>>,
}

impl RecordingTransport {
    pub fn take(&self) -> Vec<InboundMessage> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionMessage> {
        self.take()
            .into_iter()
            .filter_map(|m| match m {
                InboundMessage::Subscription(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

impl TransportPort for RecordingTransport {
    fn send(&self, message: InboundMessage) {
        self.sent.lock().push(message);
    }
}

/// Reply sink that records every delivery.
#[derive(Debug, Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<OutboundMessage>>,
}

impl RecordingSink {
    pub fn take(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.delivered.lock())
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionMessage> {
        self.take()
            .into_iter()
            .filter_map(|m| match m {
                OutboundMessage::Subscription(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

impl ReplySink for RecordingSink {
    fn deliver(&self, message: OutboundMessage) {
        self.delivered.lock().push(message);
    }
}

pub struct Harness {
    pub mux: Arc<SubscriptionMultiplexer>,
    pub transport: Arc<RecordingTransport>,
    pub sink: Arc<RecordingSink>,
}

/// Multiplexer whose own ids start above any id the tests hand out.
pub fn harness(restore_on_reconnect: bool) -> Harness {
    harness_with_ids(
        restore_on_reconnect,
        Arc::new(IncrementalIdGenerator::starting_after(10_000)),
    )
}

/// Multiplexer drawing its ids from `ids`.
pub fn harness_with_ids(
    restore_on_reconnect: bool,
    ids: Arc<dyn TransactionIdGenerator>,
) -> Harness {
    let transport = Arc::new(RecordingTransport::default());
    let sink = Arc::new(RecordingSink::default());
    let mux = SubscriptionMultiplexer::new(
        MultiplexerSettings {
            restore_on_reconnect,
            support_subscription_by_security: true,
        },
        Arc::clone(&transport) as Arc<dyn TransportPort>,
        Arc::clone(&sink) as Arc<dyn ReplySink>,
        ids,
    );
    Harness {
        mux: Arc::new(mux),
        transport,
        sink,
    }
}

pub fn candles(code: &str) -> StreamSpec {
    StreamSpec::candles(
        CandleSeries::TimeFrame(Duration::from_secs(60)),
        SecurityId::new(code, "TQBR").unwrap(),
    )
    .unwrap()
}

pub fn subscribe(id: TransactionId, stream: StreamSpec) -> InboundMessage {
    InboundMessage::Subscription(SubscriptionMessage::subscribe(id, stream))
}

pub fn unsubscribe(id: TransactionId, stream: StreamSpec) -> InboundMessage {
    InboundMessage::Subscription(SubscriptionMessage::unsubscribe(id, None, stream))
}

/// Transport success reply to `request`.
pub fn ok(request: &SubscriptionMessage) -> OutboundMessage {
    OutboundMessage::Subscription(request.reply(None, false))
}

pub fn correlation_ids(replies: &[SubscriptionMessage]) -> Vec<TransactionId> {
    let mut ids: Vec<_> = replies
        .iter()
        .filter_map(|r| r.original_transaction_id)
        .collect();
    ids.sort_unstable();
    ids
}
