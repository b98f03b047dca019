//! Subscription Multiplexing Domain
//!
//! Canonical key derivation and the ledger that reference-counts logical
//! subscriptions per key.
//!
//! # Design
//!
//! The ledger tracks:
//! - One aggregate record per canonical key (template, join history, count)
//! - A reverse index from caller transaction id to the record answering it
//! - Whether each record's physical subscription has been confirmed
//!
//! This allows any number of callers to subscribe to the same stream while
//! the venue sees exactly one subscribe and one unsubscribe.

mod key;
mod ledger;

pub use key::{CandleKey, MarketKey, SubscriptionKey, derive_key};
pub use ledger::{
    ActiveSubscription, Admission, FanOut, LedgerStats, RequestOrigin, SubscriptionLedger,
};
