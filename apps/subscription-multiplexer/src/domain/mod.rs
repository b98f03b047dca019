//! Domain Layer - Core subscription types and bookkeeping.
//!
//! This layer contains the message value types and the subscription ledger.
//! Nothing here locks, logs or performs I/O.

/// Subscription request/reply value types.
pub mod message;

/// Canonical keys and the subscription ledger.
pub mod subscription;
