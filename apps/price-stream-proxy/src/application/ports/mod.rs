//! Port Interfaces
//!
//! Contracts between the streaming service and the upstream feed, following
//! the Hexagonal Architecture pattern. Infrastructure adapters implement
//! these; tests substitute in-memory fakes.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`UpstreamConnector`]: opens a session with the price feed and hands back
//!   an [`UpstreamLink`] of typed frames

use std::pin::Pin;

use async_trait::async_trait;
use futures::Sink;
use futures::stream::BoxStream;

use crate::domain::streaming::{InboundFrame, OutboundFrame};

// =============================================================================
// Errors
// =============================================================================

/// Failure of the upstream transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Opening the connection failed.
    #[error("connection failed: {0}")]
    Connect(String),
    /// Opening the connection did not finish in time.
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),
    /// Sending a frame failed.
    #[error("send failed: {0}")]
    Send(String),
    /// Receiving from the connection failed.
    #[error("receive failed: {0}")]
    Receive(String),
    /// Encoding an outbound frame failed.
    #[error("encode failed: {0}")]
    Encode(String),
}

// =============================================================================
// Upstream Link
// =============================================================================

/// Outbound half of an upstream session.
pub type FrameSink = Pin<Box<dyn Sink<OutboundFrame, Error = TransportError> + Send>>;

/// Inbound half of an upstream session.
///
/// Ends when the upstream closes the connection.
pub type FrameStream = BoxStream<'static, Result<InboundFrame, TransportError>>;

/// An established upstream session, split into its two halves.
pub struct UpstreamLink {
    /// Frames to the upstream.
    pub sink: FrameSink,
    /// Frames from the upstream.
    pub stream: FrameStream,
}

impl UpstreamLink {
    /// Bundle a sink and stream.
    #[must_use]
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

impl std::fmt::Debug for UpstreamLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamLink").finish_non_exhaustive()
    }
}

/// Opens sessions with the upstream price feed.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Open a new session.
    async fn connect(&self) -> Result<UpstreamLink, TransportError>;

    /// Endpoint description for logs, with credentials redacted.
    fn endpoint(&self) -> String;
}
