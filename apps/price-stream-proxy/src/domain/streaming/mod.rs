//! Market Data Streaming Types
//!
//! Core domain types for market data: price samples and the protocol-agnostic
//! frames exchanged with the upstream feed. These types are codec-agnostic;
//! the wire encoding lives in the infrastructure adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::subscription::Symbol;

// =============================================================================
// Price Sample
// =============================================================================

/// Latest observed price for a symbol.
///
/// Immutable once constructed; a newer sample replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSample {
    symbol: Symbol,
    price: f64,
    source_timestamp: i64,
    observed_at: i64,
}

impl PriceSample {
    /// Create a new sample.
    ///
    /// `source_timestamp` is epoch seconds, `observed_at` epoch milliseconds.
    #[must_use]
    pub const fn new(symbol: Symbol, price: f64, source_timestamp: i64, observed_at: i64) -> Self {
        Self {
            symbol,
            price,
            source_timestamp,
            observed_at,
        }
    }

    /// Build a sample from an upstream price update received at `received_at`.
    ///
    /// A missing upstream timestamp falls back to the receipt time.
    #[must_use]
    pub fn from_update(update: PriceUpdate, received_at: DateTime<Utc>) -> Self {
        Self {
            symbol: update.symbol,
            price: update.price,
            source_timestamp: update.timestamp.unwrap_or_else(|| received_at.timestamp()),
            observed_at: received_at.timestamp_millis(),
        }
    }

    /// Symbol this sample belongs to.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Last traded / quoted price.
    #[must_use]
    pub const fn price(&self) -> f64 {
        self.price
    }

    /// Upstream event time (epoch seconds).
    #[must_use]
    pub const fn source_timestamp(&self) -> i64 {
        self.source_timestamp
    }

    /// Local receipt time (epoch milliseconds).
    #[must_use]
    pub const fn observed_at(&self) -> i64 {
        self.observed_at
    }
}

// =============================================================================
// Inbound Frames
// =============================================================================

/// A price event from the upstream feed.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    /// Normalized symbol.
    pub symbol: Symbol,
    /// Price value.
    pub price: f64,
    /// Upstream event time in epoch seconds, if provided.
    pub timestamp: Option<i64>,
}

/// Result of a subscribe or unsubscribe action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionAck {
    /// Upstream status string (`ok`, `error`).
    pub status: Option<String>,
    /// Symbols the action succeeded for.
    pub success: Vec<Symbol>,
    /// Symbols the action failed for.
    pub fails: Vec<Symbol>,
}

impl SubscriptionAck {
    /// Check if any symbol failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.fails.is_empty()
    }
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Price update.
    Price(PriceUpdate),
    /// Subscribe acknowledgement.
    SubscribeStatus(SubscriptionAck),
    /// Unsubscribe acknowledgement.
    UnsubscribeStatus(SubscriptionAck),
    /// Heartbeat acknowledgement.
    Heartbeat {
        /// Upstream status string.
        status: Option<String>,
    },
    /// Well-formed frame with an event we do not handle.
    Unrecognized {
        /// Event discriminant, if any.
        event: Option<String>,
    },
}

impl InboundFrame {
    /// Short label for logging and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Price(_) => "price",
            Self::SubscribeStatus(_) => "subscribe_status",
            Self::UnsubscribeStatus(_) => "unsubscribe_status",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}

// =============================================================================
// Outbound Frames
// =============================================================================

/// Frame sent to the upstream feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Subscribe to a batch of symbols.
    Subscribe(Vec<Symbol>),
    /// Unsubscribe from a batch of symbols.
    Unsubscribe(Vec<Symbol>),
    /// Keepalive.
    Heartbeat,
}

impl OutboundFrame {
    /// Short label for logging and metrics.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
            Self::Heartbeat => "heartbeat",
        }
    }

    /// Symbols carried by this frame.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        match self {
            Self::Subscribe(symbols) | Self::Unsubscribe(symbols) => symbols,
            Self::Heartbeat => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn update(timestamp: Option<i64>) -> PriceUpdate {
        PriceUpdate {
            symbol: "BTC/USD".to_string(),
            price: 65_000.5,
            timestamp,
        }
    }

    #[test]
    fn sample_keeps_upstream_timestamp() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let sample = PriceSample::from_update(update(Some(1_234_567_890)), now);

        assert_eq!(sample.symbol(), "BTC/USD");
        assert_eq!(sample.price(), 65_000.5);
        assert_eq!(sample.source_timestamp(), 1_234_567_890);
        assert_eq!(sample.observed_at(), 1_700_000_000_123);
    }

    #[test]
    fn sample_falls_back_to_receipt_time() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let sample = PriceSample::from_update(update(None), now);

        assert_eq!(sample.source_timestamp(), 1_700_000_000);
    }

    #[test]
    fn sample_serializes_camel_case() {
        let sample = PriceSample::new("AAPL".to_string(), 198.34, 1_735_659_932, 1_735_659_932_981);
        let json = serde_json::to_value(&sample).unwrap();

        assert_eq!(json["symbol"], "AAPL");
        assert_eq!(json["price"], 198.34);
        assert_eq!(json["sourceTimestamp"], 1_735_659_932);
        assert_eq!(json["observedAt"], 1_735_659_932_981_i64);
    }

    #[test]
    fn outbound_frame_labels() {
        let frame = OutboundFrame::Subscribe(vec!["AAPL".to_string()]);
        assert_eq!(frame.action(), "subscribe");
        assert_eq!(frame.symbols(), ["AAPL".to_string()]);
        assert!(OutboundFrame::Heartbeat.symbols().is_empty());
    }
}
