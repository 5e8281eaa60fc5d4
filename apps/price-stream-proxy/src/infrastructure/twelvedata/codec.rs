//! Twelve Data Codec
//!
//! Translates between domain frames and the JSON text frames of the
//! `quotes/price` WebSocket.

use crate::domain::streaming::{InboundFrame, OutboundFrame, PriceUpdate, SubscriptionAck};
use crate::domain::subscription::{Symbol, normalize_symbol};
use crate::infrastructure::twelvedata::messages::{
    ActionParams, ActionRequest, HeartbeatEvent, Numeric, PriceEvent, StatusEvent, SymbolEntry,
    action, event,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is valid JSON but not an object.
    #[error("expected JSON object, got: {0}")]
    NotAnObject(String),

    /// A required field is missing or empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field has an unusable value.
    #[error("invalid {field}: {value}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
}

/// JSON codec for the Twelve Data price stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct TwelveDataCodec;

impl TwelveDataCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode an outbound frame as JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, frame: &OutboundFrame) -> Result<String, CodecError> {
        let request = match frame {
            OutboundFrame::Subscribe(symbols) => ActionRequest {
                action: action::SUBSCRIBE,
                params: Some(ActionParams {
                    symbols: symbols.join(","),
                }),
            },
            OutboundFrame::Unsubscribe(symbols) => ActionRequest {
                action: action::UNSUBSCRIBE,
                params: Some(ActionParams {
                    symbols: symbols.join(","),
                }),
            },
            OutboundFrame::Heartbeat => ActionRequest {
                action: action::HEARTBEAT,
                params: None,
            },
        };

        Ok(serde_json::to_string(&request)?)
    }

    /// Decode an inbound JSON text frame.
    ///
    /// Frames with an unknown or missing `event` decode to
    /// [`InboundFrame::Unrecognized`]. A `price` event without a symbol or
    /// a finite price is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object or a known event
    /// is malformed.
    pub fn decode(&self, text: &str) -> Result<InboundFrame, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if !value.is_object() {
            let preview: String = text.trim().chars().take(50).collect();
            return Err(CodecError::NotAnObject(preview));
        }

        let kind = value
            .get("event")
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string);

        match kind.as_deref() {
            Some(event::PRICE) => {
                let price: PriceEvent = serde_json::from_value(value)?;
                Ok(InboundFrame::Price(Self::price_update(price)?))
            }
            Some(event::SUBSCRIBE_STATUS) => {
                let status: StatusEvent = serde_json::from_value(value)?;
                Ok(InboundFrame::SubscribeStatus(Self::ack(status)))
            }
            Some(event::UNSUBSCRIBE_STATUS) => {
                let status: StatusEvent = serde_json::from_value(value)?;
                Ok(InboundFrame::UnsubscribeStatus(Self::ack(status)))
            }
            Some(event::HEARTBEAT) => {
                let heartbeat: HeartbeatEvent = serde_json::from_value(value)?;
                Ok(InboundFrame::Heartbeat {
                    status: heartbeat.status,
                })
            }
            _ => Ok(InboundFrame::Unrecognized { event: kind }),
        }
    }

    fn price_update(price: PriceEvent) -> Result<PriceUpdate, CodecError> {
        let symbol = price
            .symbol
            .as_deref()
            .and_then(normalize_symbol)
            .ok_or(CodecError::MissingField("symbol"))?;

        let raw_price = price.price.ok_or(CodecError::MissingField("price"))?;
        let value = raw_price.as_f64().ok_or_else(|| CodecError::InvalidField {
            field: "price",
            value: format!("{raw_price:?}"),
        })?;

        Ok(PriceUpdate {
            symbol,
            price: value,
            timestamp: price.timestamp.as_ref().and_then(epoch_seconds),
        })
    }

    fn ack(status: StatusEvent) -> SubscriptionAck {
        SubscriptionAck {
            status: status.status,
            success: symbols(status.success),
            fails: symbols(status.fails),
        }
    }
}

/// Positive whole epoch seconds, or `None` for anything unusable.
#[allow(clippy::cast_possible_truncation)]
fn epoch_seconds(value: &Numeric) -> Option<i64> {
    value
        .as_f64()
        .filter(|seconds| *seconds > 0.0 && *seconds < 9.0e15)
        .map(|seconds| seconds.trunc() as i64)
}

fn symbols(entries: Option<Vec<SymbolEntry>>) -> Vec<Symbol> {
    entries
        .unwrap_or_default()
        .iter()
        .filter_map(|entry| normalize_symbol(entry.symbol()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn decode(text: &str) -> Result<InboundFrame, CodecError> {
        TwelveDataCodec::new().decode(text)
    }

    fn price(text: &str) -> PriceUpdate {
        match decode(text).unwrap() {
            InboundFrame::Price(update) => update,
            other => panic!("expected price, got {other:?}"),
        }
    }

    #[test]
    fn encode_subscribe_joins_symbols() {
        let json = TwelveDataCodec::new()
            .encode(&OutboundFrame::Subscribe(vec![
                "AAPL".to_string(),
                "BTC/USD".to_string(),
            ]))
            .unwrap();
        assert_eq!(
            json,
            r#"{"action":"subscribe","params":{"symbols":"AAPL,BTC/USD"}}"#
        );
    }

    #[test]
    fn encode_unsubscribe_and_heartbeat() {
        let codec = TwelveDataCodec::new();
        assert_eq!(
            codec
                .encode(&OutboundFrame::Unsubscribe(vec!["MSFT".to_string()]))
                .unwrap(),
            r#"{"action":"unsubscribe","params":{"symbols":"MSFT"}}"#
        );
        assert_eq!(
            codec.encode(&OutboundFrame::Heartbeat).unwrap(),
            r#"{"action":"heartbeat"}"#
        );
    }

    #[test]
    fn decode_price_with_numeric_fields() {
        let update = price(
            r#"{"event":"price","symbol":"AAPL","currency":"USD","exchange":"NASDAQ",
                "type":"Common Stock","timestamp":1735659932,"price":198.34,"day_volume":4521}"#,
        );
        assert_eq!(update.symbol, "AAPL");
        assert_eq!(update.price, 198.34);
        assert_eq!(update.timestamp, Some(1_735_659_932));
    }

    #[test]
    fn decode_price_with_string_price() {
        let update = price(r#"{"event":"price","symbol":"btc/usd","price":"65000.5","timestamp":1735659932}"#);
        assert_eq!(update.symbol, "BTC/USD");
        assert_eq!(update.price, 65_000.5);
        assert_eq!(update.timestamp, Some(1_735_659_932));
    }

    #[test_case(r#""timestamp":"soon","# ; "non numeric")]
    #[test_case(r#""timestamp":0,"# ; "zero")]
    #[test_case("" ; "absent")]
    fn decode_price_without_usable_timestamp(timestamp: &str) {
        let update = price(&format!(
            r#"{{"event":"price",{timestamp}"symbol":"AAPL","price":1.5}}"#
        ));
        assert_eq!(update.timestamp, None);
    }

    #[test_case(r#"{"event":"price","price":1.0}"# ; "missing symbol")]
    #[test_case(r#"{"event":"price","symbol":"  ","price":1.0}"# ; "blank symbol")]
    #[test_case(r#"{"event":"price","symbol":"AAPL"}"# ; "missing price")]
    #[test_case(r#"{"event":"price","symbol":"AAPL","price":"n/a"}"# ; "non numeric price")]
    #[test_case(r#"{"event":"price","symbol":"AAPL","price":null}"# ; "null price")]
    fn decode_invalid_price(text: &str) {
        assert!(decode(text).is_err());
    }

    #[test_case("not json" ; "garbage")]
    #[test_case("[1,2,3]" ; "array")]
    #[test_case("\"price\"" ; "string")]
    fn decode_unparsable(text: &str) {
        assert!(decode(text).is_err());
    }

    #[test]
    fn decode_subscribe_status() {
        let frame = decode(
            r#"{"event":"subscribe-status","status":"error",
                "success":[{"symbol":"AAPL","exchange":"NASDAQ"}],
                "fails":[{"symbol":"bogus"}]}"#,
        )
        .unwrap();

        assert_eq!(
            frame,
            InboundFrame::SubscribeStatus(SubscriptionAck {
                status: Some("error".to_string()),
                success: vec!["AAPL".to_string()],
                fails: vec!["BOGUS".to_string()],
            })
        );
    }

    #[test]
    fn decode_unsubscribe_status_with_null_lists() {
        let frame =
            decode(r#"{"event":"unsubscribe-status","status":"ok","success":null,"fails":null}"#)
                .unwrap();
        assert_eq!(
            frame,
            InboundFrame::UnsubscribeStatus(SubscriptionAck {
                status: Some("ok".to_string()),
                ..SubscriptionAck::default()
            })
        );
    }

    #[test]
    fn decode_heartbeat() {
        assert_eq!(
            decode(r#"{"event":"heartbeat","status":"ok"}"#).unwrap(),
            InboundFrame::Heartbeat {
                status: Some("ok".to_string())
            }
        );
    }

    #[test_case(r#"{"event":"reconnect"}"#, Some("reconnect") ; "unknown event")]
    #[test_case(r#"{"status":"ok"}"#, None ; "no event")]
    fn decode_unrecognized(text: &str, expected: Option<&str>) {
        assert_eq!(
            decode(text).unwrap(),
            InboundFrame::Unrecognized {
                event: expected.map(ToString::to_string)
            }
        );
    }
}
