//! Transaction id generation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Correlation id matching requests to replies.
pub type TransactionId = u64;

/// Source of fresh, globally unique transaction ids.
pub trait TransactionIdGenerator: Send + Sync {
    /// Return the next id.
    fn next_id(&self) -> TransactionId;
}

/// Monotonically increasing id source.
#[derive(Debug)]
pub struct IncrementalIdGenerator {
    current: AtomicU64,
}

impl IncrementalIdGenerator {
    /// Create a generator whose first id is `start + 1`.
    #[must_use]
    pub const fn starting_after(start: TransactionId) -> Self {
        Self {
            current: AtomicU64::new(start),
        }
    }
}

impl Default for IncrementalIdGenerator {
    fn default() -> Self {
        Self::starting_after(0)
    }
}

impl TransactionIdGenerator for IncrementalIdGenerator {
    fn next_id(&self) -> TransactionId {
        self.current.fetch_add(1, Ordering::Relaxed) + 1
    }
}
