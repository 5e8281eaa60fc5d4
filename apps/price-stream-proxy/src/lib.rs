#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Price Stream Proxy - Single-Upstream Price Cache
//!
//! Maintains one WebSocket connection to the Twelve Data price feed,
//! multiplexes symbol subscriptions from many HTTP callers onto it, and
//! serves the latest price per symbol from an in-memory cache.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types and state machines, no I/O
//!   - `subscription`: Desired / active / pending symbol sets
//!   - `connection`: Upstream session lifecycle
//!   - `streaming`: Price samples and upstream frames
//!   - `cache`: Latest-value price cache
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Upstream connector interface
//!   - `services`: Price stream, message router, heartbeat and reconnect timers
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `twelvedata`: WebSocket connector and JSON codec
//!   - `http`: axum HTTP API
//!   - `config`: Environment configuration
//!   - `metrics` / `telemetry`: Prometheus and tracing
//!
//! # Data Flow
//!
//! ```text
//!                 subscribe / unsubscribe
//! HTTP clients ─────────────────────────────► PriceStream ──► Twelve Data WS
//!      ▲                                          │                │
//!      │ GET /prices                              │ price events   │
//!      └──────────────── PriceCache ◄── Router ◄──┴────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::cache::PriceCache;
pub use domain::connection::{ConnectionState, SessionId};
pub use domain::streaming::{InboundFrame, OutboundFrame, PriceSample, PriceUpdate};
pub use domain::subscription::{SubscriptionBook, Symbol};

// Application services
pub use application::ports::{TransportError, UpstreamConnector, UpstreamLink};
pub use application::services::{AckMode, PriceStream, StreamSettings, StreamStatus};

// Infrastructure config
pub use infrastructure::config::{ApiKey, ConfigError, ProxyConfig};

// HTTP server
pub use infrastructure::http::{HttpServer, HttpServerError, router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
