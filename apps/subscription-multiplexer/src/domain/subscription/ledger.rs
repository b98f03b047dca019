//! Subscription Ledger
//!
//! The mutable bookkeeping behind the multiplexer: four keyed registries
//! (market, candle, news, portfolio), an arena of aggregate records and a
//! reverse index from caller transaction id to the record that will answer it.
//!
//! The ledger is a plain state machine with no locking of its own. The caller
//! wraps it in a single mutex so every registry and the reverse index change
//! together.
//!
//! # Record lifetime
//!
//! A record is created by the first subscriber for its key and leaves its
//! registry when the subscriber count returns to zero. The record itself (and
//! its reverse index entries) stays in the arena until the reply to the final
//! physical unsubscribe arrives, so the leavers can still be answered.
//!
//! Members are only kept while they wait for a transport reply. Once the
//! subscribe is confirmed the answered joiners are dropped, and joiners or
//! non-final leavers arriving afterwards are acknowledged locally, so a
//! long-lived group's membership does not grow with churn.

use std::collections::HashMap;

use super::key::{CandleKey, MarketKey, SubscriptionKey, derive_key};
use crate::domain::message::{
    StreamCategory, StreamSpec, SubscriptionError, SubscriptionMessage, TransactionId,
};

type RecordId = u64;

// =============================================================================
// Decisions
// =============================================================================

/// What the multiplexer must do with an accepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Send this request to the transport.
    Forward(SubscriptionMessage),
    /// Answer the caller locally with this reply; the transport is not involved.
    Reply(SubscriptionMessage),
    /// Bookkeeping only; the caller will be answered by a later fan-out.
    Absorbed,
}

/// Where a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    /// Issued by a caller.
    Caller,
    /// Re-injected after a reconnect, carrying the group's previous subscriber count.
    Restore {
        /// Subscribers the group had before the reconnect.
        subscribers: usize,
    },
}

impl RequestOrigin {
    const fn joining_subscribers(self) -> usize {
        match self {
            Self::Caller => 1,
            Self::Restore { subscribers } => {
                if subscribers == 0 {
                    1
                } else {
                    subscribers
                }
            }
        }
    }
}

/// Per-caller replies produced from one transport reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOut {
    /// One reply per member of the answered cycle, in join order.
    pub replies: Vec<SubscriptionMessage>,
    /// Whether the group was removed from the ledger.
    pub torn_down: bool,
    /// Category of the group.
    pub category: StreamCategory,
}

/// A group that is live in one of the registries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSubscription {
    /// The request that created the group.
    pub template: SubscriptionMessage,
    /// Current subscriber count.
    pub subscribers: usize,
}

// =============================================================================
// Records
// =============================================================================

#[derive(Debug)]
struct AggregateRecord {
    key: SubscriptionKey,
    template: SubscriptionMessage,
    members: Vec<SubscriptionMessage>,
    subscribers: usize,
    is_subscribed: bool,
}

#[derive(Debug)]
struct PortfolioAggregate {
    template: SubscriptionMessage,
    subscribers: usize,
}

// =============================================================================
// Ledger
// =============================================================================

/// Registries, records and reverse index for every tracked stream.
///
/// # Example
///
/// ```rust
/// use subscription_multiplexer::domain::message::{
///     MarketDataType, SecurityId, StreamSpec, SubscriptionMessage,
/// };
/// use subscription_multiplexer::domain::subscription::{Admission, RequestOrigin, SubscriptionLedger};
///
/// let mut ledger = SubscriptionLedger::new();
/// let stream = StreamSpec::market(MarketDataType::Level1, SecurityId::new("AAPL", "XNAS").unwrap());
///
/// // First subscriber goes to the wire
/// let first = SubscriptionMessage::subscribe(1, stream.clone());
/// assert!(matches!(ledger.accept(&first, true, RequestOrigin::Caller), Admission::Forward(_)));
///
/// // Second subscriber waits for the same reply
/// let second = SubscriptionMessage::subscribe(2, stream.clone());
/// assert_eq!(ledger.accept(&second, true, RequestOrigin::Caller), Admission::Absorbed);
///
/// // One transport reply answers both
/// let fan_out = ledger.resolve_reply(&first.reply(None, false)).unwrap();
/// assert_eq!(fan_out.replies.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionLedger {
    market: HashMap<MarketKey, RecordId>,
    candles: HashMap<CandleKey, RecordId>,
    news: HashMap<String, RecordId>,
    portfolios: HashMap<String, PortfolioAggregate>,
    records: HashMap<RecordId, AggregateRecord>,
    by_transaction: HashMap<TransactionId, RecordId>,
    next_record_id: RecordId,
}

impl SubscriptionLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Account for an inbound subscribe or unsubscribe and decide its external effect.
    ///
    /// `by_security` selects whether the instrument takes part in the key.
    pub fn accept(
        &mut self,
        message: &SubscriptionMessage,
        by_security: bool,
        origin: RequestOrigin,
    ) -> Admission {
        let key = derive_key(&message.stream, by_security);
        if let SubscriptionKey::Portfolio(name) = key {
            return self.accept_portfolio(name, message, origin);
        }

        let existing = self.lookup(&key);
        let (subscribers, is_subscribed, template_id) = existing
            .and_then(|id| self.records.get(&id))
            .map_or((0, false, None), |record| {
                (
                    record.subscribers,
                    record.is_subscribed,
                    Some(record.template.transaction_id),
                )
            });

        let (remaining, admission) = if message.is_subscribe {
            let admission = if subscribers == 0 {
                Admission::Forward(message.clone())
            } else if is_subscribed {
                Admission::Reply(message.reply(None, false))
            } else {
                Admission::Absorbed
            };
            (subscribers + origin.joining_subscribers(), admission)
        } else {
            if subscribers == 0 {
                return Admission::Reply(non_existent(message));
            }
            let remaining = subscribers - 1;
            let admission = if remaining == 0 {
                Admission::Forward(with_original_id(message, template_id))
            } else if is_subscribed {
                Admission::Reply(message.reply(None, false))
            } else {
                Admission::Absorbed
            };
            (remaining, admission)
        };

        let record_id = existing.unwrap_or_else(|| self.create_record(key.clone(), message));

        if let Some(record) = self.records.get_mut(&record_id) {
            record.subscribers = remaining;
            if !matches!(admission, Admission::Reply(_)) {
                record.members.push(message.clone());
            }
        }
        if !matches!(admission, Admission::Reply(_)) {
            self.by_transaction.insert(message.transaction_id, record_id);
        }
        if remaining == 0 {
            self.unregister(&key);
        }

        admission
    }

    fn accept_portfolio(
        &mut self,
        name: String,
        message: &SubscriptionMessage,
        origin: RequestOrigin,
    ) -> Admission {
        if message.is_subscribe {
            let aggregate = self
                .portfolios
                .entry(name)
                .or_insert_with(|| PortfolioAggregate {
                    template: message.clone(),
                    subscribers: 0,
                });
            let first = aggregate.subscribers == 0;
            aggregate.subscribers += origin.joining_subscribers();

            return if first {
                Admission::Forward(message.clone())
            } else {
                Admission::Reply(message.reply(None, false))
            };
        }

        let Some(aggregate) = self.portfolios.get_mut(&name) else {
            return Admission::Reply(non_existent(message));
        };

        aggregate.subscribers = aggregate.subscribers.saturating_sub(1);
        if aggregate.subscribers > 0 {
            return Admission::Reply(message.reply(None, false));
        }

        let template_id = aggregate.template.transaction_id;
        self.portfolios.remove(&name);
        Admission::Forward(with_original_id(message, Some(template_id)))
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Translate a transport reply into per-caller replies.
    ///
    /// Returns `None` when the reply does not belong to any tracked group and
    /// must be passed through unchanged.
    pub fn resolve_reply(&mut self, reply: &SubscriptionMessage) -> Option<FanOut> {
        let answered = reply.original_transaction_id?;
        let record_id = *self.by_transaction.get(&answered)?;

        let Some(record) = self.records.get(&record_id) else {
            self.by_transaction.retain(|_, id| *id != record_id);
            return None;
        };

        let is_subscribe = record
            .members
            .iter()
            .find(|member| member.transaction_id == answered)
            .map_or(reply.is_subscribe, |member| member.is_subscribe);

        // Only the members of the answered cycle; the other direction waits for its own reply
        let replies: Vec<_> = record
            .members
            .iter()
            .filter(|member| member.is_subscribe == is_subscribe)
            .map(|member| member.reply_with_outcome_of(reply))
            .collect();
        let category = record.key.category();

        let torn_down = !is_subscribe || reply.is_failure();
        if torn_down {
            self.teardown(record_id);
        } else if let Some(record) = self.records.get_mut(&record_id) {
            record.is_subscribed = true;
            // Answered joiners are done; later joiners are answered locally
            let joiners: Vec<_> = record
                .members
                .iter()
                .filter(|member| member.is_subscribe)
                .map(|member| member.transaction_id)
                .collect();
            record.members.retain(|member| !member.is_subscribe);
            for id in joiners {
                self.by_transaction.remove(&id);
            }
        }

        Some(FanOut {
            replies,
            torn_down,
            category,
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Snapshot every group live in a registry, then clear the whole ledger.
    pub fn drain_active(&mut self) -> Vec<ActiveSubscription> {
        let mut active: Vec<_> = self
            .market
            .values()
            .chain(self.candles.values())
            .chain(self.news.values())
            .filter_map(|id| self.records.get(id))
            .map(|record| ActiveSubscription {
                template: record.template.clone(),
                subscribers: record.subscribers,
            })
            .collect();

        active.extend(self.portfolios.values().map(|aggregate| ActiveSubscription {
            template: aggregate.template.clone(),
            subscribers: aggregate.subscribers,
        }));

        self.clear();
        active
    }

    /// Drop every registry entry, record and reverse index entry.
    pub fn clear(&mut self) {
        self.market.clear();
        self.candles.clear();
        self.news.clear();
        self.portfolios.clear();
        self.records.clear();
        self.by_transaction.clear();
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current subscriber count for the group `stream` belongs to.
    #[must_use]
    pub fn subscriber_count(&self, stream: &StreamSpec, by_security: bool) -> usize {
        match derive_key(stream, by_security) {
            SubscriptionKey::Portfolio(name) => {
                self.portfolios.get(&name).map_or(0, |p| p.subscribers)
            }
            key => self
                .lookup(&key)
                .and_then(|id| self.records.get(&id))
                .map_or(0, |record| record.subscribers),
        }
    }

    /// Whether the group `stream` belongs to has a confirmed wire subscription.
    #[must_use]
    pub fn is_active(&self, stream: &StreamSpec, by_security: bool) -> bool {
        let key = derive_key(stream, by_security);
        self.lookup(&key)
            .and_then(|id| self.records.get(&id))
            .is_some_and(|record| record.is_subscribed)
    }

    /// Whether a reply to `transaction_id` would be fanned out.
    #[must_use]
    pub fn is_tracked(&self, transaction_id: TransactionId) -> bool {
        self.by_transaction.contains_key(&transaction_id)
    }

    /// Whether nothing is tracked at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.portfolios.is_empty() && self.by_transaction.is_empty()
    }

    /// Ledger statistics.
    #[must_use]
    pub fn stats(&self) -> LedgerStats {
        let registered = self.market.len() + self.candles.len() + self.news.len();
        LedgerStats {
            market_groups: self.market.len(),
            candle_groups: self.candles.len(),
            news_groups: self.news.len(),
            portfolio_groups: self.portfolios.len(),
            subscribers: self
                .records
                .values()
                .map(|record| record.subscribers)
                .chain(self.portfolios.values().map(|p| p.subscribers))
                .sum(),
            tracked_transactions: self.by_transaction.len(),
            awaiting_teardown: self.records.len().saturating_sub(registered),
        }
    }

    // =========================================================================
    // Registry helpers
    // =========================================================================

    fn lookup(&self, key: &SubscriptionKey) -> Option<RecordId> {
        match key {
            SubscriptionKey::Market(k) => self.market.get(k).copied(),
            SubscriptionKey::Candle(k) => self.candles.get(k).copied(),
            SubscriptionKey::News(k) => self.news.get(k).copied(),
            SubscriptionKey::Portfolio(_) => None,
        }
    }

    fn register(&mut self, key: SubscriptionKey, id: RecordId) {
        match key {
            SubscriptionKey::Market(k) => {
                self.market.insert(k, id);
            }
            SubscriptionKey::Candle(k) => {
                self.candles.insert(k, id);
            }
            SubscriptionKey::News(k) => {
                self.news.insert(k, id);
            }
            SubscriptionKey::Portfolio(_) => {}
        }
    }

    fn unregister(&mut self, key: &SubscriptionKey) {
        match key {
            SubscriptionKey::Market(k) => {
                self.market.remove(k);
            }
            SubscriptionKey::Candle(k) => {
                self.candles.remove(k);
            }
            SubscriptionKey::News(k) => {
                self.news.remove(k);
            }
            SubscriptionKey::Portfolio(k) => {
                self.portfolios.remove(k);
            }
        }
    }

    fn create_record(&mut self, key: SubscriptionKey, template: &SubscriptionMessage) -> RecordId {
        self.next_record_id += 1;
        let id = self.next_record_id;
        self.records.insert(
            id,
            AggregateRecord {
                key: key.clone(),
                template: template.clone(),
                members: Vec::new(),
                subscribers: 0,
                is_subscribed: false,
            },
        );
        self.register(key, id);
        id
    }

    fn teardown(&mut self, record_id: RecordId) {
        if let Some(record) = self.records.remove(&record_id)
            && self.lookup(&record.key) == Some(record_id)
        {
            self.unregister(&record.key);
        }
        self.by_transaction.retain(|_, id| *id != record_id);
    }
}

fn non_existent(message: &SubscriptionMessage) -> SubscriptionMessage {
    message.reply(
        Some(SubscriptionError::NonExistent {
            transaction_id: message.transaction_id,
        }),
        false,
    )
}

fn with_original_id(
    message: &SubscriptionMessage,
    template_id: Option<TransactionId>,
) -> SubscriptionMessage {
    let mut forward = message.clone();
    if forward.original_transaction_id.is_none() {
        forward.original_transaction_id = template_id;
    }
    forward
}

// =============================================================================
// Statistics
// =============================================================================

/// Ledger statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    /// Live market data groups.
    pub market_groups: usize,
    /// Live candle groups.
    pub candle_groups: usize,
    /// Live news groups.
    pub news_groups: usize,
    /// Live portfolio groups.
    pub portfolio_groups: usize,
    /// Sum of subscriber counts.
    pub subscribers: usize,
    /// Transaction ids resolvable through the reverse index.
    pub tracked_transactions: usize,
    /// Records out of their registry, waiting for the final unsubscribe reply.
    pub awaiting_teardown: usize,
}

impl LedgerStats {
    /// Total live groups across all categories.
    #[must_use]
    pub const fn total_groups(&self) -> usize {
        self.market_groups + self.candle_groups + self.news_groups + self.portfolio_groups
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;
    use crate::domain::message::{CandleSeries, MarketDataType, SecurityId};

    fn candles() -> StreamSpec {
        StreamSpec::candles(
            CandleSeries::TimeFrame(Duration::from_secs(60)),
            SecurityId::new("X", "BOARD").unwrap(),
        )
        .unwrap()
    }

    fn quotes(code: &str) -> StreamSpec {
        StreamSpec::market(MarketDataType::Level1, SecurityId::new(code, "BOARD").unwrap())
    }

    fn sub(id: TransactionId, stream: StreamSpec) -> SubscriptionMessage {
        SubscriptionMessage::subscribe(id, stream)
    }

    fn unsub(id: TransactionId, stream: StreamSpec) -> SubscriptionMessage {
        SubscriptionMessage::unsubscribe(id, None, stream)
    }

    fn accept(ledger: &mut SubscriptionLedger, message: &SubscriptionMessage) -> Admission {
        ledger.accept(message, true, RequestOrigin::Caller)
    }

    #[test]
    fn first_subscriber_forwards() {
        let mut ledger = SubscriptionLedger::new();
        let request = sub(1, candles());

        assert_eq!(accept(&mut ledger, &request), Admission::Forward(request));
        assert_eq!(ledger.subscriber_count(&candles(), true), 1);
        assert!(ledger.is_tracked(1));
    }

    #[test]
    fn pending_joiner_is_absorbed() {
        let mut ledger = SubscriptionLedger::new();
        accept(&mut ledger, &sub(1, candles()));

        assert_eq!(accept(&mut ledger, &sub(2, candles())), Admission::Absorbed);
        assert_eq!(ledger.subscriber_count(&candles(), true), 2);
        assert!(ledger.is_tracked(2));
    }

    #[test]
    fn confirmed_joiner_gets_local_reply() {
        let mut ledger = SubscriptionLedger::new();
        let first = sub(1, candles());
        accept(&mut ledger, &first);
        ledger.resolve_reply(&first.reply(None, false)).unwrap();

        let Admission::Reply(reply) = accept(&mut ledger, &sub(2, candles())) else {
            panic!("expected local reply");
        };
        assert_eq!(reply.original_transaction_id, Some(2));
        assert!(reply.error.is_none());
        // Locally answered joiners never enter the reverse index
        assert!(!ledger.is_tracked(2));
        assert_eq!(ledger.subscriber_count(&candles(), true), 2);
    }

    #[test]
    fn fan_out_reaches_every_pending_joiner() {
        let mut ledger = SubscriptionLedger::new();
        let first = sub(10, candles());
        accept(&mut ledger, &first);
        accept(&mut ledger, &sub(11, candles()));
        accept(&mut ledger, &sub(12, candles()));

        let fan_out = ledger.resolve_reply(&first.reply(None, false)).unwrap();

        let ids: Vec<_> = fan_out
            .replies
            .iter()
            .map(|r| r.original_transaction_id)
            .collect();
        assert_eq!(ids, vec![Some(10), Some(11), Some(12)]);
        assert!(!fan_out.torn_down);
        assert_eq!(fan_out.category, StreamCategory::Candle);
        assert!(ledger.is_active(&candles(), true));
    }

    #[test]
    fn unknown_reply_passes_through() {
        let mut ledger = SubscriptionLedger::new();
        accept(&mut ledger, &sub(1, candles()));

        let stray = sub(99, candles()).reply(None, false);
        assert!(ledger.resolve_reply(&stray).is_none());

        let uncorrelated = sub(100, candles());
        assert!(ledger.resolve_reply(&uncorrelated).is_none());
    }

    #[test]
    fn unsubscribe_forwards_only_on_last_leaver() {
        let mut ledger = SubscriptionLedger::new();
        let first = sub(1, candles());
        accept(&mut ledger, &first);
        accept(&mut ledger, &sub(2, candles()));

        assert_eq!(accept(&mut ledger, &unsub(3, candles())), Admission::Absorbed);
        assert_eq!(ledger.subscriber_count(&candles(), true), 1);

        let Admission::Forward(forward) = accept(&mut ledger, &unsub(4, candles())) else {
            panic!("expected physical unsubscribe");
        };
        assert!(!forward.is_subscribe);
        assert_eq!(forward.transaction_id, 4);
        assert_eq!(forward.original_transaction_id, Some(1));
        assert_eq!(ledger.subscriber_count(&candles(), true), 0);
    }

    #[test]
    fn unsubscribe_keeps_caller_original_id() {
        let mut ledger = SubscriptionLedger::new();
        accept(&mut ledger, &sub(1, candles()));

        let request = SubscriptionMessage::unsubscribe(2, Some(77), candles());
        let Admission::Forward(forward) = accept(&mut ledger, &request) else {
            panic!("expected physical unsubscribe");
        };
        assert_eq!(forward.original_transaction_id, Some(77));
    }

    #[test]
    fn unsubscribe_without_subscribers_is_rejected_locally() {
        let mut ledger = SubscriptionLedger::new();

        let Admission::Reply(reply) = accept(&mut ledger, &unsub(5, candles())) else {
            panic!("expected local error");
        };
        assert_eq!(reply.original_transaction_id, Some(5));
        assert_eq!(
            reply.error,
            Some(SubscriptionError::NonExistent { transaction_id: 5 })
        );
        assert!(ledger.is_empty());
    }

    #[test]
    fn unsubscribe_reply_tears_group_down() {
        let mut ledger = SubscriptionLedger::new();
        let first = sub(1, candles());
        accept(&mut ledger, &first);
        accept(&mut ledger, &sub(2, candles()));

        // Leavers of a still-pending group wait for the wire
        assert_eq!(accept(&mut ledger, &unsub(3, candles())), Admission::Absorbed);
        let last = unsub(4, candles());
        accept(&mut ledger, &last);
        assert_eq!(ledger.stats().awaiting_teardown, 1);

        let fan_out = ledger.resolve_reply(&last.reply(None, false)).unwrap();

        let ids: Vec<_> = fan_out
            .replies
            .iter()
            .map(|r| r.original_transaction_id)
            .collect();
        assert_eq!(ids, vec![Some(3), Some(4)]);
        assert!(fan_out.replies.iter().all(|r| !r.is_subscribe));
        assert!(fan_out.torn_down);
        assert!(ledger.is_empty());
        for id in 1..=4 {
            assert!(!ledger.is_tracked(id));
        }
    }

    #[test]
    fn churn_on_confirmed_group_keeps_membership_bounded() {
        let mut ledger = SubscriptionLedger::new();
        let first = sub(1, candles());
        accept(&mut ledger, &first);
        accept(&mut ledger, &sub(2, candles()));
        ledger.resolve_reply(&first.reply(None, false)).unwrap();
        assert_eq!(ledger.stats().tracked_transactions, 0);

        for round in 0..100 {
            let id = 10 + round * 2;
            assert!(matches!(accept(&mut ledger, &sub(id, candles())), Admission::Reply(_)));
            let Admission::Reply(ack) = accept(&mut ledger, &unsub(id + 1, candles())) else {
                panic!("expected local acknowledgement");
            };
            assert_eq!(ack.original_transaction_id, Some(id + 1));
            assert!(ack.error.is_none());
        }
        assert_eq!(ledger.subscriber_count(&candles(), true), 2);
        assert_eq!(ledger.stats().tracked_transactions, 0);

        assert!(matches!(accept(&mut ledger, &unsub(500, candles())), Admission::Reply(_)));
        let last = unsub(501, candles());
        assert!(matches!(accept(&mut ledger, &last), Admission::Forward(_)));

        let fan_out = ledger.resolve_reply(&last.reply(None, false)).unwrap();
        assert_eq!(fan_out.replies.len(), 1);
        assert_eq!(fan_out.replies[0].original_transaction_id, Some(501));
        assert!(ledger.is_empty());
    }

    #[test]
    fn rejection_tears_group_down_and_reaches_all() {
        let mut ledger = SubscriptionLedger::new();
        let first = sub(1, candles());
        accept(&mut ledger, &first);
        accept(&mut ledger, &sub(2, candles()));

        let rejection = first.reply(
            Some(SubscriptionError::Rejected {
                reason: "no data".to_string(),
            }),
            false,
        );
        let fan_out = ledger.resolve_reply(&rejection).unwrap();

        assert_eq!(fan_out.replies.len(), 2);
        assert!(fan_out.replies.iter().all(|r| r.error == rejection.error));
        assert!(fan_out.torn_down);
        assert!(ledger.is_empty());

        // Members must resubmit; the next subscribe starts a fresh group
        assert!(matches!(
            accept(&mut ledger, &sub(3, candles())),
            Admission::Forward(_)
        ));
    }

    #[test]
    fn not_supported_tears_group_down() {
        let mut ledger = SubscriptionLedger::new();
        let first = sub(1, quotes("AAPL"));
        accept(&mut ledger, &first);

        let fan_out = ledger.resolve_reply(&first.reply(None, true)).unwrap();

        assert!(fan_out.torn_down);
        assert!(fan_out.replies[0].is_not_supported);
        assert!(!ledger.is_tracked(1));
        assert_eq!(ledger.stats().total_groups(), 0);
    }

    #[test]
    fn resubscribe_while_awaiting_unsubscribe_starts_new_group() {
        let mut ledger = SubscriptionLedger::new();
        let first = sub(1, candles());
        accept(&mut ledger, &first);
        let leave = unsub(2, candles());
        accept(&mut ledger, &leave);

        let again = sub(3, candles());
        assert_eq!(accept(&mut ledger, &again), Admission::Forward(again.clone()));

        // Old group's teardown must not disturb the new one
        ledger.resolve_reply(&leave.reply(None, false)).unwrap();
        assert_eq!(ledger.subscriber_count(&candles(), true), 1);
        assert!(ledger.is_tracked(3));
        assert!(!ledger.is_tracked(1));
    }

    #[test]
    fn drain_returns_templates_with_counts() {
        let mut ledger = SubscriptionLedger::new();
        accept(&mut ledger, &sub(1, candles()));
        accept(&mut ledger, &sub(2, candles()));
        accept(&mut ledger, &sub(3, quotes("AAPL")));
        accept(&mut ledger, &sub(4, StreamSpec::news(None::<String>)));
        accept(&mut ledger, &sub(5, StreamSpec::portfolio("main").unwrap()));

        let mut active = ledger.drain_active();
        active.sort_by_key(|a| a.template.transaction_id);

        let summary: Vec<_> = active
            .iter()
            .map(|a| (a.template.transaction_id, a.subscribers))
            .collect();
        assert_eq!(summary, vec![(1, 2), (3, 1), (4, 1), (5, 1)]);
        assert!(ledger.is_empty());
        assert_eq!(ledger.stats(), LedgerStats::default());
    }

    #[test]
    fn restore_origin_carries_previous_count() {
        let mut ledger = SubscriptionLedger::new();
        let restored = sub(50, candles());

        let admission = ledger.accept(&restored, true, RequestOrigin::Restore { subscribers: 3 });

        assert_eq!(admission, Admission::Forward(restored));
        assert_eq!(ledger.subscriber_count(&candles(), true), 3);
    }

    #[test]
    fn portfolio_counts_without_fan_out() {
        let mut ledger = SubscriptionLedger::new();
        let main = StreamSpec::portfolio("Main").unwrap();
        let first = sub(1, main.clone());

        assert_eq!(accept(&mut ledger, &first), Admission::Forward(first.clone()));
        assert!(matches!(
            accept(&mut ledger, &sub(2, StreamSpec::portfolio("MAIN").unwrap())),
            Admission::Reply(_)
        ));
        assert!(matches!(
            accept(&mut ledger, &unsub(3, main.clone())),
            Admission::Reply(_)
        ));

        let Admission::Forward(forward) = accept(&mut ledger, &unsub(4, main.clone())) else {
            panic!("expected physical unsubscribe");
        };
        assert_eq!(forward.original_transaction_id, Some(1));

        // Portfolio replies are never tracked
        assert!(ledger.resolve_reply(&first.reply(None, false)).is_none());
        assert!(matches!(
            accept(&mut ledger, &unsub(5, main)),
            Admission::Reply(SubscriptionMessage { error: Some(_), .. })
        ));
    }

    #[test]
    fn wildcard_policy_merges_instruments() {
        let mut ledger = SubscriptionLedger::new();
        assert!(matches!(
            ledger.accept(&sub(1, quotes("AAPL")), false, RequestOrigin::Caller),
            Admission::Forward(_)
        ));
        assert_eq!(
            ledger.accept(&sub(2, quotes("MSFT")), false, RequestOrigin::Caller),
            Admission::Absorbed
        );
        assert_eq!(ledger.stats().market_groups, 1);
    }

    #[test]
    fn stats_are_accurate() {
        let mut ledger = SubscriptionLedger::new();
        accept(&mut ledger, &sub(1, candles()));
        accept(&mut ledger, &sub(2, candles()));
        accept(&mut ledger, &sub(3, quotes("AAPL")));
        accept(&mut ledger, &sub(4, StreamSpec::portfolio("main").unwrap()));

        let stats = ledger.stats();
        assert_eq!(stats.candle_groups, 1);
        assert_eq!(stats.market_groups, 1);
        assert_eq!(stats.portfolio_groups, 1);
        assert_eq!(stats.subscribers, 4);
        assert_eq!(stats.tracked_transactions, 3);
        assert_eq!(stats.total_groups(), 3);
    }

    proptest! {
        #[test]
        fn physical_traffic_matches_count_transitions(ops in prop::collection::vec(any::<bool>(), 1..64)) {
            let mut ledger = SubscriptionLedger::new();
            let mut count = 0usize;
            let mut expected_subscribes = 0;
            let mut expected_unsubscribes = 0;
            let mut subscribes = 0;
            let mut unsubscribes = 0;

            for (index, is_subscribe) in ops.into_iter().enumerate() {
                let id = index as TransactionId + 1;
                let message = if is_subscribe { sub(id, candles()) } else { unsub(id, candles()) };

                if is_subscribe {
                    if count == 0 { expected_subscribes += 1; }
                    count += 1;
                } else if count > 0 {
                    count -= 1;
                    if count == 0 { expected_unsubscribes += 1; }
                }

                if let Admission::Forward(forward) = accept(&mut ledger, &message) {
                    if forward.is_subscribe { subscribes += 1; } else { unsubscribes += 1; }
                }
                prop_assert_eq!(ledger.subscriber_count(&candles(), true), count);
            }

            prop_assert_eq!(subscribes, expected_subscribes);
            prop_assert_eq!(unsubscribes, expected_unsubscribes);
        }
    }
}
