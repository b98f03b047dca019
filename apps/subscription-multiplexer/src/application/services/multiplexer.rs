//! Subscription Multiplexer
//!
//! Sits between callers and the venue transport. Inbound requests are
//! accounted in the ledger and either forwarded, answered locally or absorbed;
//! transport replies are fanned out to every caller waiting on the same group;
//! connect/disconnect/reset signals clear or rebuild the ledger.
//!
//! The ledger lock is never held while calling a port: every decision is made
//! under the lock, then the resulting messages are dispatched after release.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::application::ports::{ReplySink, TransportPort};
use crate::domain::message::{
    InboundMessage, OutboundMessage, StreamSpec, SubscriptionMessage,
    TransactionId, TransactionIdGenerator,
};
use crate::domain::subscription::{
    ActiveSubscription, Admission, FanOut, LedgerStats, RequestOrigin, SubscriptionLedger,
};
use crate::infrastructure::config::MultiplexerSettings;
use crate::infrastructure::metrics::{self, LocalReplyReason, TeardownReason};

/// Thread-safe subscription multiplexer.
///
/// Any number of threads may call [`submit`](Self::submit) while the
/// transport's delivery path calls
/// [`handle_transport_message`](Self::handle_transport_message).
pub struct SubscriptionMultiplexer {
    ledger: Mutex<SubscriptionLedger>,
    settings: RwLock<MultiplexerSettings>,
    ids: Arc<dyn TransactionIdGenerator>,
    transport: Arc<dyn TransportPort>,
    replies: Arc<dyn ReplySink>,
}

impl std::fmt::Debug for SubscriptionMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionMultiplexer")
            .field("settings", &*self.settings.read())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SubscriptionMultiplexer {
    /// Create a multiplexer.
    ///
    /// `ids` mints the correlation ids of restore and teardown requests. It
    /// must be the same source callers draw their own ids from, otherwise a
    /// minted id can collide with a caller id and capture its reply.
    #[must_use]
    pub fn new(
        settings: MultiplexerSettings,
        transport: Arc<dyn TransportPort>,
        replies: Arc<dyn ReplySink>,
        ids: Arc<dyn TransactionIdGenerator>,
    ) -> Self {
        Self {
            ledger: Mutex::new(SubscriptionLedger::new()),
            settings: RwLock::new(settings),
            ids,
            transport,
            replies,
        }
    }

    /// Next id from the shared id source, for callers building requests.
    #[must_use]
    pub fn next_transaction_id(&self) -> TransactionId {
        self.ids.next_id()
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> MultiplexerSettings {
        *self.settings.read()
    }

    /// Replace the settings; applies to messages processed from now on.
    pub fn update_settings(&self, settings: MultiplexerSettings) {
        *self.settings.write() = settings;
    }

    // =========================================================================
    // Inbound (caller → transport)
    // =========================================================================

    /// Accept a message from a caller.
    pub fn submit(&self, message: InboundMessage) {
        match message {
            InboundMessage::Subscription(request) => {
                self.submit_subscription(request, RequestOrigin::Caller);
            }
            InboundMessage::Reset => self.reset(),
            InboundMessage::Disconnect => self.disconnect(),
            InboundMessage::Connect => self.transport.send(InboundMessage::Connect),
        }
    }

    fn submit_subscription(&self, request: SubscriptionMessage, origin: RequestOrigin) {
        let by_security = self.settings.read().support_subscription_by_security;
        let category = request.category();

        let (admission, stats) = {
            let mut ledger = self.ledger.lock();
            let admission = ledger.accept(&request, by_security, origin);
            (admission, ledger.stats())
        };
        metrics::set_groups(&stats);

        match admission {
            Admission::Forward(forward) => {
                tracing::info!(
                    transaction_id = forward.transaction_id,
                    original_transaction_id = ?forward.original_transaction_id,
                    category = category.as_str(),
                    subscribe = forward.is_subscribe,
                    restore = matches!(origin, RequestOrigin::Restore { .. }),
                    "Forwarding subscription to transport"
                );
                metrics::record_physical_request(category, forward.is_subscribe);
                self.transport.send(InboundMessage::Subscription(forward));
            }
            Admission::Reply(reply) => {
                let reason = if reply.error.is_some() {
                    tracing::warn!(
                        transaction_id = request.transaction_id,
                        category = category.as_str(),
                        "Unsubscribe for non-existent subscription"
                    );
                    LocalReplyReason::NonExistent
                } else {
                    tracing::debug!(
                        transaction_id = request.transaction_id,
                        category = category.as_str(),
                        subscribe = request.is_subscribe,
                        "Answered locally from active subscription"
                    );
                    if request.is_subscribe {
                        LocalReplyReason::AlreadySubscribed
                    } else {
                        LocalReplyReason::OthersRemain
                    }
                };
                metrics::record_local_reply(category, reason);
                self.replies.deliver(OutboundMessage::Subscription(reply));
            }
            Admission::Absorbed => {
                tracing::debug!(
                    transaction_id = request.transaction_id,
                    category = category.as_str(),
                    subscribe = request.is_subscribe,
                    "Joined pending subscription group"
                );
            }
        }
    }

    fn reset(&self) {
        if !self.settings.read().restore_on_reconnect {
            self.ledger.lock().clear();
            metrics::set_groups(&LedgerStats::default());
            tracing::info!("Subscription ledger cleared on reset");
        }
        self.transport.send(InboundMessage::Reset);
    }

    fn disconnect(&self) {
        if !self.settings.read().restore_on_reconnect {
            let active = self.ledger.lock().drain_active();
            metrics::set_groups(&LedgerStats::default());

            tracing::info!(
                groups = active.len(),
                "Unsubscribing active streams before disconnect"
            );
            for ActiveSubscription { template, .. } in active {
                let unsubscribe = SubscriptionMessage::unsubscribe(
                    self.ids.next_id(),
                    Some(template.transaction_id),
                    template.stream,
                );
                metrics::record_physical_request(unsubscribe.category(), false);
                self.transport.send(InboundMessage::Subscription(unsubscribe));
            }
        }
        self.transport.send(InboundMessage::Disconnect);
    }

    // =========================================================================
    // Outbound (transport → callers)
    // =========================================================================

    /// Accept a message emitted by the transport.
    pub fn handle_transport_message(&self, message: OutboundMessage) {
        match message {
            OutboundMessage::Subscription(reply) => self.fan_out(reply),
            OutboundMessage::Connect { error } => self.connected(error),
            OutboundMessage::Disconnect { error } => self.disconnected(error),
        }
    }

    fn fan_out(&self, reply: SubscriptionMessage) {
        let (fan_out, stats) = {
            let mut ledger = self.ledger.lock();
            let fan_out = ledger.resolve_reply(&reply);
            (fan_out, ledger.stats())
        };

        let Some(FanOut {
            replies,
            torn_down,
            category,
        }) = fan_out
        else {
            tracing::trace!(
                original_transaction_id = ?reply.original_transaction_id,
                "Passing through untracked reply"
            );
            self.replies.deliver(OutboundMessage::Subscription(reply));
            return;
        };

        metrics::set_groups(&stats);
        metrics::record_fan_out(category, replies.len() as u64);
        if torn_down {
            let reason = if reply.is_failure() {
                tracing::warn!(
                    original_transaction_id = ?reply.original_transaction_id,
                    category = category.as_str(),
                    error = ?reply.error,
                    not_supported = reply.is_not_supported,
                    subscribers = replies.len(),
                    "Subscription rejected by transport"
                );
                TeardownReason::Rejected
            } else {
                TeardownReason::Unsubscribed
            };
            metrics::record_teardown(category, reason);
        }

        tracing::debug!(
            original_transaction_id = ?reply.original_transaction_id,
            category = category.as_str(),
            replies = replies.len(),
            torn_down,
            "Fanning out transport reply"
        );
        for per_caller in replies {
            self.replies.deliver(OutboundMessage::Subscription(per_caller));
        }
    }

    fn connected(&self, error: Option<String>) {
        let restore = error.is_none() && self.settings.read().restore_on_reconnect;
        let active = if restore {
            self.ledger.lock().drain_active()
        } else {
            Vec::new()
        };

        self.replies.deliver(OutboundMessage::Connect { error });

        if active.is_empty() {
            return;
        }

        tracing::info!(groups = active.len(), "Restoring subscriptions after reconnect");
        metrics::record_restored(active.len() as u64);
        for ActiveSubscription {
            template,
            subscribers,
        } in active
        {
            let request = SubscriptionMessage::subscribe(self.ids.next_id(), template.stream);
            self.submit_subscription(request, RequestOrigin::Restore { subscribers });
        }
    }

    fn disconnected(&self, error: Option<String>) {
        if !self.settings.read().restore_on_reconnect {
            self.ledger.lock().clear();
            metrics::set_groups(&LedgerStats::default());
        }
        if let Some(reason) = &error {
            tracing::warn!(error = %reason, "Transport disconnected");
        }
        self.replies.deliver(OutboundMessage::Disconnect { error });
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Ledger statistics.
    #[must_use]
    pub fn stats(&self) -> LedgerStats {
        self.ledger.lock().stats()
    }

    /// Subscriber count of the group `stream` belongs to under the current settings.
    #[must_use]
    pub fn subscriber_count(&self, stream: &StreamSpec) -> usize {
        let by_security = self.settings.read().support_subscription_by_security;
        self.ledger.lock().subscriber_count(stream, by_security)
    }

    /// Whether a transport reply to `transaction_id` would be fanned out.
    #[must_use]
    pub fn is_tracked(&self, transaction_id: TransactionId) -> bool {
        self.ledger.lock().is_tracked(transaction_id)
    }
}

// =============================================================================
// Tests
// =============================================================================
