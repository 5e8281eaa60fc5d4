//! Twelve Data WebSocket Connector
//!
//! Opens a TLS WebSocket to the `quotes/price` endpoint and adapts it to the
//! [`UpstreamConnector`] port: text frames are decoded into domain frames,
//! undecodable frames are counted and dropped, and a close frame ends the
//! stream.

use std::time::Instant;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt, future};
use tokio_tungstenite::tungstenite::Message;

use crate::application::ports::{TransportError, UpstreamConnector, UpstreamLink};
use crate::domain::streaming::{InboundFrame, OutboundFrame};
use crate::infrastructure::config::ApiKey;
use crate::infrastructure::metrics;

use super::codec::TwelveDataCodec;

/// Connector for the Twelve Data price stream.
#[derive(Debug, Clone)]
pub struct TwelveDataConnector {
    url: String,
    api_key: ApiKey,
    codec: TwelveDataCodec,
}

impl TwelveDataConnector {
    /// Create a connector for `url`, authenticating with `api_key`.
    #[must_use]
    pub fn new(url: impl Into<String>, api_key: ApiKey) -> Self {
        Self {
            url: url.into(),
            api_key,
            codec: TwelveDataCodec::new(),
        }
    }

    /// Endpoint URL with the API key attached as a query parameter.
    fn request_url(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{separator}apikey={}", self.url, self.api_key.expose())
    }

    /// Strip the API key from transport error messages.
    fn redact(&self, message: &str) -> String {
        message.replace(self.api_key.expose(), "[REDACTED]")
    }
}

#[async_trait]
impl UpstreamConnector for TwelveDataConnector {
    async fn connect(&self) -> Result<UpstreamLink, TransportError> {
        metrics::record_connect_attempt();
        let started = Instant::now();

        let (ws_stream, _response) = tokio_tungstenite::connect_async(self.request_url())
            .await
            .map_err(|e| {
                metrics::record_websocket_error("connect");
                TransportError::Connect(self.redact(&e.to_string()))
            })?;

        metrics::record_connect_duration(started.elapsed());
        tracing::debug!(endpoint = %self.endpoint(), "WebSocket handshake complete");

        let (write, read) = ws_stream.split();
        let codec = self.codec;

        let sink = write
            .sink_map_err(|e| {
                metrics::record_websocket_error("send");
                TransportError::Send(e.to_string())
            })
            .with(move |frame: OutboundFrame| {
                let encoded = codec
                    .encode(&frame)
                    .map(|text| {
                        metrics::record_frame_sent(frame.action());
                        Message::Text(text.into())
                    })
                    .map_err(|e| TransportError::Encode(e.to_string()));
                future::ready(encoded)
            });

        let stream = read
            .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
            .filter_map(move |message| future::ready(decode_message(codec, message)));

        Ok(UpstreamLink::new(Box::pin(sink), stream.boxed()))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

/// Map one WebSocket message to at most one inbound frame.
///
/// Control and binary messages yield nothing; tungstenite answers pings
/// itself.
fn decode_message(
    codec: TwelveDataCodec,
    message: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<InboundFrame, TransportError>> {
    match message {
        Ok(Message::Text(text)) => match codec.decode(&text) {
            Ok(frame) => {
                metrics::record_frame_received(frame.kind());
                Some(Ok(frame))
            }
            Err(e) => {
                metrics::record_decode_failure();
                tracing::debug!(error = %e, "Dropping undecodable frame");
                None
            }
        },
        Ok(Message::Binary(_)) => {
            tracing::trace!("Ignoring binary frame");
            None
        }
        Ok(_) => None,
        Err(e) => {
            metrics::record_websocket_error("receive");
            Some(Err(TransportError::Receive(e.to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector(url: &str) -> TwelveDataConnector {
        TwelveDataConnector::new(url, ApiKey::new("secret-key").unwrap())
    }

    #[test]
    fn request_url_appends_key() {
        assert_eq!(
            connector("wss://ws.twelvedata.com/v1/quotes/price").request_url(),
            "wss://ws.twelvedata.com/v1/quotes/price?apikey=secret-key"
        );
        assert_eq!(
            connector("ws://localhost:9000/price?format=json").request_url(),
            "ws://localhost:9000/price?format=json&apikey=secret-key"
        );
    }

    #[test]
    fn endpoint_hides_key() {
        let connector = connector("wss://ws.twelvedata.com/v1/quotes/price");
        assert!(!connector.endpoint().contains("secret-key"));
        assert_eq!(
            connector.redact("failed to connect to ...?apikey=secret-key"),
            "failed to connect to ...?apikey=[REDACTED]"
        );
    }

    #[test]
    fn decode_text_message() {
        let frame = decode_message(
            TwelveDataCodec::new(),
            Ok(Message::Text(
                r#"{"event":"price","symbol":"AAPL","price":"198.34"}"#.into(),
            )),
        );
        assert!(matches!(frame, Some(Ok(InboundFrame::Price(_)))));
    }

    #[test]
    fn undecodable_and_control_messages_are_dropped() {
        let codec = TwelveDataCodec::new();
        assert!(decode_message(codec, Ok(Message::Text("{oops".into()))).is_none());
        assert!(decode_message(codec, Ok(Message::Ping(vec![1].into()))).is_none());
        assert!(decode_message(codec, Ok(Message::Binary(vec![1, 2].into()))).is_none());
    }

    #[test]
    fn transport_errors_surface() {
        let frame = decode_message(
            TwelveDataCodec::new(),
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed),
        );
        assert!(matches!(frame, Some(Err(TransportError::Receive(_)))));
    }

    #[tokio::test]
    async fn connect_failure_is_redacted() {
        // Nothing listens on port 9 locally
        let result = connector("ws://127.0.0.1:9/price").connect().await;
        match result {
            Err(TransportError::Connect(message)) => assert!(!message.contains("secret-key")),
            other => panic!("expected connect error, got {other:?}"),
        }
    }
}
