//! Subscription Message Types
//!
//! Value types exchanged between callers, the multiplexer and the venue
//! transport. A single [`SubscriptionMessage`] shape is used for requests,
//! transport replies and per-caller replies; replies differ only in carrying
//! an `original_transaction_id` and an optional outcome.
//!
//! Stream categories are a tagged enum ([`StreamSpec`]) so each category
//! carries only the fields its canonical key is derived from.

mod transaction;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use transaction::{IncrementalIdGenerator, TransactionId, TransactionIdGenerator};

// =============================================================================
// Errors
// =============================================================================

/// Caller contract violations detected while building a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Security code was empty.
    #[error("security code cannot be empty")]
    EmptySecurityCode,
    /// Portfolio name was empty.
    #[error("portfolio name cannot be empty")]
    EmptyPortfolioName,
    /// Candle argument is zero or negative.
    #[error("invalid candle argument: {0}")]
    InvalidCandleArgument(String),
    /// Requested range ends before it starts.
    #[error("range start {from} is after range end {to}")]
    InvalidRange {
        /// Range start.
        from: DateTime<Utc>,
        /// Range end.
        to: DateTime<Utc>,
    },
}

/// Failure outcome attached to a subscription reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum SubscriptionError {
    /// Unsubscribe for a stream with no active subscribers.
    #[error("subscription {transaction_id} does not exist")]
    NonExistent {
        /// Correlation id of the rejected unsubscribe.
        transaction_id: TransactionId,
    },
    /// The venue rejected the physical request.
    #[error("subscription rejected by venue: {reason}")]
    Rejected {
        /// Venue-supplied reason.
        reason: String,
    },
}

// =============================================================================
// Security Identifier
// =============================================================================

/// Instrument identifier (`code@board`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecurityId {
    code: String,
    board: String,
}

impl SecurityId {
    /// Create a security identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::EmptySecurityCode`] if `code` is empty.
    pub fn new(code: impl Into<String>, board: impl Into<String>) -> Result<Self, RequestError> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(RequestError::EmptySecurityCode);
        }
        Ok(Self {
            code,
            board: board.into(),
        })
    }

    /// Instrument code (ticker).
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Board / exchange code.
    #[must_use]
    pub fn board(&self) -> &str {
        &self.board
    }
}

impl fmt::Display for SecurityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.code, self.board)
    }
}

// =============================================================================
// Stream Categories
// =============================================================================

/// Non-candle market data stream types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketDataType {
    /// Best bid/ask and last trade fields.
    Level1,
    /// Order book snapshots.
    MarketDepth,
    /// Trade ticks.
    Ticks,
    /// Full order log.
    OrderLog,
}

impl MarketDataType {
    /// Get all market data types.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Level1, Self::MarketDepth, Self::Ticks, Self::OrderLog]
    }
}

/// Candle kind plus its building argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleSeries {
    /// Time-frame candles.
    TimeFrame(Duration),
    /// Candles closed every N ticks.
    Tick(u32),
    /// Candles closed every N traded volume.
    Volume(Decimal),
    /// Candles closed when price moves by a range.
    Range(Decimal),
}

impl CandleSeries {
    fn validate(&self) -> Result<(), RequestError> {
        let valid = match self {
            Self::TimeFrame(frame) => !frame.is_zero(),
            Self::Tick(count) => *count > 0,
            Self::Volume(value) | Self::Range(value) => value.is_sign_positive() && !value.is_zero(),
        };
        if valid {
            Ok(())
        } else {
            Err(RequestError::InvalidCandleArgument(format!("{self:?}")))
        }
    }
}

/// Ordinary market data stream parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketDataSpec {
    /// Stream type.
    pub data_type: MarketDataType,
    /// Instrument, or `None` for every instrument.
    pub security_id: Option<SecurityId>,
    /// Optional history start.
    pub from: Option<DateTime<Utc>>,
    /// Optional history end.
    pub to: Option<DateTime<Utc>>,
    /// Optional maximum number of historical items.
    pub count: Option<u64>,
    /// Order book depth (market depth streams).
    pub max_depth: Option<u32>,
}

/// Candle stream parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleSpec {
    /// Candle kind and argument.
    pub series: CandleSeries,
    /// Instrument, or `None` for every instrument.
    pub security_id: Option<SecurityId>,
    /// Optional history start.
    pub from: Option<DateTime<Utc>>,
    /// Optional history end.
    pub to: Option<DateTime<Utc>>,
}

/// News stream parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsSpec {
    /// Single news item, or `None` for the whole news feed.
    pub news_id: Option<String>,
}

/// Portfolio / account update stream parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSpec {
    /// Portfolio (account) name.
    pub portfolio_name: String,
}

/// The stream a subscription message refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamSpec {
    /// Quotes, depth, ticks or order log.
    Market(MarketDataSpec),
    /// Candles.
    Candle(CandleSpec),
    /// News.
    News(NewsSpec),
    /// Portfolio and position updates.
    Portfolio(PortfolioSpec),
}

impl StreamSpec {
    /// Ordinary market data stream for one instrument.
    #[must_use]
    pub const fn market(data_type: MarketDataType, security_id: SecurityId) -> Self {
        Self::Market(MarketDataSpec {
            data_type,
            security_id: Some(security_id),
            from: None,
            to: None,
            count: None,
            max_depth: None,
        })
    }

    /// Ordinary market data stream from fully specified parameters.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidRange`] if `from` is after `to`.
    pub fn market_with(spec: MarketDataSpec) -> Result<Self, RequestError> {
        check_range(spec.from, spec.to)?;
        Ok(Self::Market(spec))
    }

    /// Candle stream for one instrument.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidCandleArgument`] for a zero or negative argument.
    pub fn candles(series: CandleSeries, security_id: SecurityId) -> Result<Self, RequestError> {
        Self::candles_with(CandleSpec {
            series,
            security_id: Some(security_id),
            from: None,
            to: None,
        })
    }

    /// Candle stream from fully specified parameters.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid candle argument or range.
    pub fn candles_with(spec: CandleSpec) -> Result<Self, RequestError> {
        spec.series.validate()?;
        check_range(spec.from, spec.to)?;
        Ok(Self::Candle(spec))
    }

    /// News stream; `None` subscribes to every news item.
    #[must_use]
    pub fn news(news_id: Option<impl Into<String>>) -> Self {
        Self::News(NewsSpec {
            news_id: news_id.map(Into::into),
        })
    }

    /// Portfolio update stream.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::EmptyPortfolioName`] if `name` is blank.
    pub fn portfolio(name: impl Into<String>) -> Result<Self, RequestError> {
        let portfolio_name = name.into();
        if portfolio_name.trim().is_empty() {
            return Err(RequestError::EmptyPortfolioName);
        }
        Ok(Self::Portfolio(PortfolioSpec { portfolio_name }))
    }

    /// Category of this stream.
    #[must_use]
    pub const fn category(&self) -> StreamCategory {
        match self {
            Self::Market(_) => StreamCategory::Market,
            Self::Candle(_) => StreamCategory::Candle,
            Self::News(_) => StreamCategory::News,
            Self::Portfolio(_) => StreamCategory::Portfolio,
        }
    }
}

fn check_range(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Result<(), RequestError> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(RequestError::InvalidRange { from, to }),
        _ => Ok(()),
    }
}

/// Stream category discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamCategory {
    /// Ordinary market data.
    Market,
    /// Candles.
    Candle,
    /// News.
    News,
    /// Portfolio updates.
    Portfolio,
}

impl StreamCategory {
    /// Get all categories.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Market, Self::Candle, Self::News, Self::Portfolio]
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Candle => "candle",
            Self::News => "news",
            Self::Portfolio => "portfolio",
        }
    }
}

// =============================================================================
// Subscription Message
// =============================================================================

/// A subscribe/unsubscribe request, or a reply to one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    /// Correlation id assigned by whoever issued this message.
    pub transaction_id: TransactionId,
    /// On replies: the request being answered. On unsubscribes: the subscribe being cancelled.
    pub original_transaction_id: Option<TransactionId>,
    /// `true` to subscribe, `false` to unsubscribe.
    pub is_subscribe: bool,
    /// The stream.
    pub stream: StreamSpec,
    /// Failure outcome (replies only).
    pub error: Option<SubscriptionError>,
    /// The venue does not support this stream (replies only).
    pub is_not_supported: bool,
}

impl SubscriptionMessage {
    /// Create a subscribe request.
    #[must_use]
    pub const fn subscribe(transaction_id: TransactionId, stream: StreamSpec) -> Self {
        Self {
            transaction_id,
            original_transaction_id: None,
            is_subscribe: true,
            stream,
            error: None,
            is_not_supported: false,
        }
    }

    /// Create an unsubscribe request cancelling `original_transaction_id` if given.
    #[must_use]
    pub const fn unsubscribe(
        transaction_id: TransactionId,
        original_transaction_id: Option<TransactionId>,
        stream: StreamSpec,
    ) -> Self {
        Self {
            transaction_id,
            original_transaction_id,
            is_subscribe: false,
            stream,
            error: None,
            is_not_supported: false,
        }
    }

    /// Build a reply answering this request.
    ///
    /// The reply is a copy of the request correlated to its own transaction id,
    /// carrying the given outcome.
    #[must_use]
    pub fn reply(&self, error: Option<SubscriptionError>, is_not_supported: bool) -> Self {
        Self {
            original_transaction_id: Some(self.transaction_id),
            error,
            is_not_supported,
            ..self.clone()
        }
    }

    /// Build a reply answering this request with the outcome of `outcome`.
    #[must_use]
    pub fn reply_with_outcome_of(&self, outcome: &Self) -> Self {
        self.reply(outcome.error.clone(), outcome.is_not_supported)
    }

    /// Whether this reply reports a failure (error or not supported).
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.error.is_some() || self.is_not_supported
    }

    /// Category of the referenced stream.
    #[must_use]
    pub const fn category(&self) -> StreamCategory {
        self.stream.category()
    }
}

// =============================================================================
// Layer Messages
// =============================================================================

/// Messages sent by callers towards the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboundMessage {
    /// Subscribe or unsubscribe.
    Subscription(SubscriptionMessage),
    /// Ask the transport to connect.
    Connect,
    /// Discard the whole session.
    Reset,
    /// Ask the transport to disconnect.
    Disconnect,
}

/// Messages emitted by the transport towards callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundMessage {
    /// Reply to a subscription request.
    Subscription(SubscriptionMessage),
    /// Connection attempt finished.
    Connect {
        /// Failure reason, `None` on success.
        error: Option<String>,
    },
    /// Connection closed.
    Disconnect {
        /// Failure reason, `None` for an orderly close.
        error: Option<String>,
    },
}

// =============================================================================
// Tests
// =============================================================================
