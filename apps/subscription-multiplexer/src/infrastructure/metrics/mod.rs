//! Prometheus Metrics Module
//!
//! Exposes multiplexer metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Physical traffic**: Subscribes/unsubscribes actually sent to the venue
//! - **Local replies**: Replies synthesized without touching the transport
//! - **Fan-out**: Per-caller replies produced from one venue reply
//! - **Groups**: Live subscription groups per stream category
//!
//! Recording is a no-op until [`init_metrics`] installs the recorder.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::message::StreamCategory;
use crate::domain::subscription::LedgerStats;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            #[allow(clippy::expect_used)]
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "subscription_mux_physical_requests_total",
        "Subscribe/unsubscribe requests forwarded to the transport"
    );
    describe_counter!(
        "subscription_mux_local_replies_total",
        "Replies synthesized locally without transport traffic"
    );
    describe_counter!(
        "subscription_mux_fan_out_replies_total",
        "Per-caller replies produced from transport replies"
    );
    describe_counter!(
        "subscription_mux_teardowns_total",
        "Subscription groups removed after a transport reply"
    );
    describe_counter!(
        "subscription_mux_restored_total",
        "Subscription groups re-established after a reconnect"
    );
    describe_counter!(
        "subscription_mux_transport_drops_total",
        "Messages dropped because the transport channel was full or closed"
    );
    describe_gauge!(
        "subscription_mux_groups",
        "Live subscription groups per stream category"
    );
}

// =============================================================================
// Metric Labels
// =============================================================================

/// Why a reply was synthesized locally.
#[derive(Debug, Clone, Copy)]
pub enum LocalReplyReason {
    /// Joined a group whose wire subscription is already confirmed.
    AlreadySubscribed,
    /// Left a group that other subscribers keep alive.
    OthersRemain,
    /// Unsubscribed a stream nobody subscribed to.
    NonExistent,
}

impl LocalReplyReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::AlreadySubscribed => "already_subscribed",
            Self::OthersRemain => "others_remain",
            Self::NonExistent => "non_existent",
        }
    }
}

/// Why a group was torn down.
#[derive(Debug, Clone, Copy)]
pub enum TeardownReason {
    /// Final unsubscribe answered.
    Unsubscribed,
    /// Venue rejected or does not support the stream.
    Rejected,
}

impl TeardownReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Unsubscribed => "unsubscribed",
            Self::Rejected => "rejected",
        }
    }
}

const fn direction(is_subscribe: bool) -> &'static str {
    if is_subscribe { "subscribe" } else { "unsubscribe" }
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a request forwarded to the transport.
pub fn record_physical_request(category: StreamCategory, is_subscribe: bool) {
    counter!(
        "subscription_mux_physical_requests_total",
        "category" => category.as_str(),
        "direction" => direction(is_subscribe)
    )
    .increment(1);
}

/// Record a locally synthesized reply.
pub fn record_local_reply(category: StreamCategory, reason: LocalReplyReason) {
    counter!(
        "subscription_mux_local_replies_total",
        "category" => category.as_str(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record per-caller replies produced by one fan-out.
pub fn record_fan_out(category: StreamCategory, count: u64) {
    counter!(
        "subscription_mux_fan_out_replies_total",
        "category" => category.as_str()
    )
    .increment(count);
}

/// Record a group teardown.
pub fn record_teardown(category: StreamCategory, reason: TeardownReason) {
    counter!(
        "subscription_mux_teardowns_total",
        "category" => category.as_str(),
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record groups re-injected after a reconnect.
pub fn record_restored(count: u64) {
    counter!("subscription_mux_restored_total").increment(count);
}

/// Record a message the transport channel could not accept.
pub fn record_transport_drop() {
    counter!("subscription_mux_transport_drops_total").increment(1);
}

/// Update the live group gauges from ledger statistics.
#[allow(clippy::cast_precision_loss)]
pub fn set_groups(stats: &LedgerStats) {
    for category in StreamCategory::all() {
        let count = match category {
            StreamCategory::Market => stats.market_groups,
            StreamCategory::Candle => stats.candle_groups,
            StreamCategory::News => stats.news_groups,
            StreamCategory::Portfolio => stats.portfolio_groups,
        };
        gauge!(
            "subscription_mux_groups",
            "category" => category.as_str()
        )
        .set(count as f64);
    }
}

// =============================================================================
// Tests
// =============================================================================
