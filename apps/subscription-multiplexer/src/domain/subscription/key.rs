//! Canonical Subscription Keys
//!
//! Maps a stream to the key that groups every logically-equivalent request
//! onto one physical subscription. When the venue does not distinguish
//! subscriptions by instrument, the security is normalized to a wildcard.

use chrono::{DateTime, Utc};

use crate::domain::message::{
    CandleSeries, CandleSpec, MarketDataSpec, MarketDataType, SecurityId, StreamCategory,
    StreamSpec,
};

/// Key for ordinary market data streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarketKey {
    /// Stream type.
    pub data_type: MarketDataType,
    /// Instrument, `None` = wildcard.
    pub security: Option<SecurityId>,
    /// History start.
    pub from: Option<DateTime<Utc>>,
    /// History end.
    pub to: Option<DateTime<Utc>>,
    /// History item limit.
    pub count: Option<u64>,
    /// Book depth.
    pub max_depth: Option<u32>,
}

/// Key for candle streams.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandleKey {
    /// Candle kind and argument.
    pub series: CandleSeries,
    /// Instrument, `None` = wildcard.
    pub security: Option<SecurityId>,
}

/// Canonical key, one shape per stream category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    /// Ordinary market data.
    Market(MarketKey),
    /// Candles.
    Candle(CandleKey),
    /// Lower-cased news id; empty for the whole feed.
    News(String),
    /// Lower-cased portfolio name.
    Portfolio(String),
}

impl SubscriptionKey {
    /// Category this key belongs to.
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

/// Derive the canonical key for `stream`.
///
/// `by_security` keeps the instrument in the key; otherwise it is replaced by
/// the wildcard so streams for different instruments share a group.
#[must_use]
pub fn derive_key(stream: &StreamSpec, by_security: bool) -> SubscriptionKey {
    match stream {
        StreamSpec::Market(spec) => SubscriptionKey::Market(market_key(spec, by_security)),
        StreamSpec::Candle(spec) => SubscriptionKey::Candle(candle_key(spec, by_security)),
        StreamSpec::News(spec) => SubscriptionKey::News(
            spec.news_id
                .as_deref()
                .map(str::to_lowercase)
                .unwrap_or_default(),
        ),
        StreamSpec::Portfolio(spec) => {
            SubscriptionKey::Portfolio(spec.portfolio_name.to_lowercase())
        }
    }
}

fn market_key(spec: &MarketDataSpec, by_security: bool) -> MarketKey {
    MarketKey {
        data_type: spec.data_type,
        security: security_part(spec.security_id.as_ref(), by_security),
        from: spec.from,
        to: spec.to,
        count: spec.count,
        max_depth: spec.max_depth,
    }
}

fn candle_key(spec: &CandleSpec, by_security: bool) -> CandleKey {
    CandleKey {
        series: spec.series.clone(),
        security: security_part(spec.security_id.as_ref(), by_security),
    }
}

fn security_part(security: Option<&SecurityId>, by_security: bool) -> Option<SecurityId> {
    if by_security { security.cloned() } else { None }
}
