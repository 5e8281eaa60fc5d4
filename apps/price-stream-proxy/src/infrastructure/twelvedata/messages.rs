//! Twelve Data WebSocket Message Types
//!
//! Wire format of the `quotes/price` endpoint. Outbound frames carry an
//! `action`; inbound frames carry an `event` discriminant.
//!
//! ```json
//! {"action":"subscribe","params":{"symbols":"AAPL,BTC/USD"}}
//! {"event":"price","symbol":"AAPL","price":198.34,"timestamp":1735659932}
//! {"event":"subscribe-status","status":"ok","success":[{"symbol":"AAPL"}],"fails":null}
//! ```

use serde::{Deserialize, Serialize};

// =============================================================================
// Outbound
// =============================================================================

/// Action discriminants.
pub mod action {
    /// Subscribe to symbols.
    pub const SUBSCRIBE: &str = "subscribe";
    /// Unsubscribe from symbols.
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    /// Keepalive.
    pub const HEARTBEAT: &str = "heartbeat";
}

/// Outbound action frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRequest<'a> {
    /// Action name.
    pub action: &'a str,
    /// Action parameters; absent for heartbeats.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<ActionParams>,
}

/// Parameters of a subscribe/unsubscribe action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionParams {
    /// Comma-joined symbol list.
    pub symbols: String,
}

// =============================================================================
// Inbound
// =============================================================================

/// Event discriminants.
pub mod event {
    /// Price update.
    pub const PRICE: &str = "price";
    /// Subscribe acknowledgement.
    pub const SUBSCRIBE_STATUS: &str = "subscribe-status";
    /// Unsubscribe acknowledgement.
    pub const UNSUBSCRIBE_STATUS: &str = "unsubscribe-status";
    /// Heartbeat acknowledgement.
    pub const HEARTBEAT: &str = "heartbeat";
}

/// A JSON value that may be a number or a numeric string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    /// JSON number.
    Number(f64),
    /// JSON string.
    Text(String),
    /// Anything else (bool, object, ...).
    Other(serde_json::Value),
}

impl Numeric {
    /// Interpret as a finite float.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse().ok()?,
            Self::Other(_) => return None,
        };
        value.is_finite().then_some(value)
    }
}

/// `price` event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceEvent {
    /// Symbol as sent upstream.
    #[serde(default)]
    pub symbol: Option<String>,
    /// Price, number or numeric string.
    #[serde(default)]
    pub price: Option<Numeric>,
    /// Event time in epoch seconds.
    #[serde(default)]
    pub timestamp: Option<Numeric>,
}

/// Entry of a `success`/`fails` list: either an object or a bare symbol.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SymbolEntry {
    /// `{"symbol":"AAPL","exchange":"NASDAQ",...}`
    Detailed {
        /// Symbol.
        symbol: String,
    },
    /// `"AAPL"`
    Plain(String),
}

impl SymbolEntry {
    /// The symbol carried by this entry.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Detailed { symbol } | Self::Plain(symbol) => symbol,
        }
    }
}

/// `subscribe-status` / `unsubscribe-status` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StatusEvent {
    /// `ok` or `error`.
    #[serde(default)]
    pub status: Option<String>,
    /// Symbols the action succeeded for; may be `null`.
    #[serde(default)]
    pub success: Option<Vec<SymbolEntry>>,
    /// Symbols the action failed for; may be `null`.
    #[serde(default)]
    pub fails: Option<Vec<SymbolEntry>>,
}

/// `heartbeat` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HeartbeatEvent {
    /// `ok` or `error`.
    #[serde(default)]
    pub status: Option<String>,
}
