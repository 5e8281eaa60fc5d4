//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - [`PriceStream`]: owns the upstream session and subscription book
//! - [`MessageRouter`]: dispatches inbound frames
//! - `heartbeat` / `reconnect`: session timers

/// Session heartbeat task.
pub mod heartbeat;

/// Upstream session owner and public service boundary.
pub mod price_stream;

/// Reconnect delay policy.
pub mod reconnect;

/// Inbound frame dispatch.
pub mod router;

pub use price_stream::{PriceStream, StreamSettings, StreamStatus};
pub use router::{AckMode, MessageRouter, RouteOutcome};
