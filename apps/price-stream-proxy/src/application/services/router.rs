//! Inbound Message Router
//!
//! Dispatches classified upstream frames. Price updates go into the cache;
//! acknowledgements are logged and, in strict ack mode, refused symbols are
//! handed back to the caller for removal from the active set.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::application::services::heartbeat::HeartbeatState;
use crate::domain::cache::PriceCache;
use crate::domain::connection::SessionId;
use crate::domain::streaming::{InboundFrame, PriceSample, SubscriptionAck};
use crate::domain::subscription::Symbol;

// =============================================================================
// Ack Mode
// =============================================================================

/// How subscribe acknowledgements affect the active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AckMode {
    /// Symbols count as active as soon as the subscribe frame is sent.
    #[default]
    Optimistic,
    /// Symbols the upstream reports as failed are dropped from the active set.
    Strict,
}

impl AckMode {
    /// Get the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Optimistic => "optimistic",
            Self::Strict => "strict",
        }
    }
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing an [`AckMode`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid ack mode '{0}', expected 'optimistic' or 'strict'")]
pub struct ParseAckModeError(String);

impl FromStr for AckMode {
    type Err = ParseAckModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "optimistic" => Ok(Self::Optimistic),
            "strict" => Ok(Self::Strict),
            other => Err(ParseAckModeError(other.to_string())),
        }
    }
}

// =============================================================================
// Router
// =============================================================================

/// What the caller must do after a frame was routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Nothing further.
    Handled,
    /// Remove these symbols from the active set.
    Reject(Vec<Symbol>),
}

/// Routes inbound frames to the cache and heartbeat state.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    cache: Arc<PriceCache>,
    heartbeat: Arc<HeartbeatState>,
    ack_mode: AckMode,
}

impl MessageRouter {
    /// Create a router.
    #[must_use]
    pub const fn new(
        cache: Arc<PriceCache>,
        heartbeat: Arc<HeartbeatState>,
        ack_mode: AckMode,
    ) -> Self {
        Self {
            cache,
            heartbeat,
            ack_mode,
        }
    }

    /// Route one frame received on `session`.
    pub fn route(&self, session: SessionId, frame: InboundFrame) -> RouteOutcome {
        match frame {
            InboundFrame::Price(update) => {
                tracing::trace!(
                    session = %session,
                    symbol = %update.symbol,
                    price = update.price,
                    "Price update"
                );
                self.cache
                    .upsert(PriceSample::from_update(update, Utc::now()));
                RouteOutcome::Handled
            }
            InboundFrame::SubscribeStatus(ack) => self.on_subscribe_status(session, &ack),
            InboundFrame::UnsubscribeStatus(ack) => {
                tracing::debug!(
                    session = %session,
                    status = ?ack.status,
                    success = ?ack.success,
                    fails = ?ack.fails,
                    "Unsubscribe acknowledged"
                );
                RouteOutcome::Handled
            }
            InboundFrame::Heartbeat { status } => {
                tracing::trace!(session = %session, status = ?status, "Heartbeat acknowledged");
                self.heartbeat.record_ack();
                RouteOutcome::Handled
            }
            InboundFrame::Unrecognized { event } => {
                tracing::debug!(session = %session, event = ?event, "Ignoring unrecognized event");
                RouteOutcome::Handled
            }
        }
    }

    fn on_subscribe_status(&self, session: SessionId, ack: &SubscriptionAck) -> RouteOutcome {
        if !ack.has_failures() {
            tracing::debug!(
                session = %session,
                status = ?ack.status,
                success = ?ack.success,
                "Subscribe acknowledged"
            );
            return RouteOutcome::Handled;
        }

        tracing::warn!(
            session = %session,
            status = ?ack.status,
            fails = ?ack.fails,
            ack_mode = %self.ack_mode,
            "Upstream refused symbols"
        );

        match self.ack_mode {
            AckMode::Optimistic => RouteOutcome::Handled,
            AckMode::Strict => RouteOutcome::Reject(ack.fails.clone()),
        }
    }
}
