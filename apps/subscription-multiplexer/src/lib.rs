#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Subscription Multiplexer - Shared Venue Subscriptions
//!
//! Sits between many independent callers and a single venue transport.
//! Identical stream requests are collapsed into one physical subscription per
//! group; the venue's single reply is fanned back out to every caller that
//! asked, and the physical unsubscribe is only sent when the last caller
//! leaves.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Message model and subscription bookkeeping
//!   - `message`: Requests, replies, stream specifications
//!   - `subscription`: Canonical keys and the ref-counting ledger
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Transport, reply sink and transport event source
//!   - `services`: The multiplexer and its async event loop
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `broadcast`: Reply delivery over a broadcast channel
//!   - `config`: Environment-driven settings
//!   - `transport`: Bounded channel towards the venue transport
//!   - `metrics` / `telemetry`: Prometheus and OpenTelemetry
//!
//! # Data Flow
//!
//! ```text
//! Caller 1 ──┐                          ┌────────────┐
//! Caller 2 ──┼──► submit ──► Ledger ───►│ Transport  │──► Venue
//! Caller N ──┘                 │        └─────┬──────┘
//!    ▲                         │ fan-out      │ replies
//!    └──── ReplyHub ◄──────────┴──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Message model and subscription bookkeeping.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::message::{
    CandleSeries, CandleSpec, InboundMessage, IncrementalIdGenerator, MarketDataSpec,
    MarketDataType, NewsSpec, OutboundMessage, PortfolioSpec, RequestError, SecurityId,
    StreamCategory, StreamSpec, SubscriptionError, SubscriptionMessage, TransactionId,
    TransactionIdGenerator,
};
pub use domain::subscription::{LedgerStats, SubscriptionKey, SubscriptionLedger};

// Application services
pub use application::ports::{ReplySink, TransportEventSource, TransportPort};
pub use application::services::{MultiplexerService, SubscriptionMultiplexer};

// Infrastructure config
pub use infrastructure::config::{
    ChannelSettings, ConfigError, MultiplexerConfig, MultiplexerSettings,
};

// Adapters
pub use infrastructure::broadcast::{ReplyHub, ReplyHubConfig, SharedReplyHub};
pub use infrastructure::transport::{ChannelTransport, TransportError};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{
    TelemetryConfig, TelemetryError, TelemetryGuard, init as init_telemetry,
};
