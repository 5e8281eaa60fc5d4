//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Upstream frames received by event and sent by action
//! - **Connection**: Connect attempts, handshake latency, transport errors
//! - **State**: Connection state, subscription set sizes, cache size
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP port. State gauges are
//! refreshed from [`StreamStatus`] on every scrape.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::application::services::StreamStatus;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Safe to call more than once; later calls return the same handle.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            #[allow(clippy::expect_used)]
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Frame counters
    describe_counter!(
        "price_stream_frames_received_total",
        "Total frames received from the upstream feed by event"
    );
    describe_counter!(
        "price_stream_frames_sent_total",
        "Total frames sent to the upstream feed by action"
    );
    describe_counter!(
        "price_stream_decode_failures_total",
        "Total upstream frames dropped because they could not be decoded"
    );

    // Connection
    describe_counter!(
        "price_stream_connect_attempts_total",
        "Total upstream connection attempts"
    );
    describe_counter!(
        "price_stream_websocket_errors_total",
        "Total upstream WebSocket errors by type"
    );
    describe_histogram!(
        "price_stream_connect_seconds",
        "Time to complete the upstream WebSocket handshake"
    );

    // State gauges
    describe_gauge!(
        "price_stream_connection_state",
        "Upstream connection state (0 disconnected, 1 connecting, 2 connected, 3 closing_retry)"
    );
    describe_gauge!(
        "price_stream_subscriptions",
        "Subscription set sizes by set (desired, active, pending)"
    );
    describe_gauge!("price_stream_cache_symbols", "Number of symbols with a cached price");
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a frame received from the upstream feed.
pub fn record_frame_received(event: &'static str) {
    counter!("price_stream_frames_received_total", "event" => event).increment(1);
}

/// Record a frame sent to the upstream feed.
pub fn record_frame_sent(action: &'static str) {
    counter!("price_stream_frames_sent_total", "action" => action).increment(1);
}

/// Record an upstream frame that failed to decode.
pub fn record_decode_failure() {
    counter!("price_stream_decode_failures_total").increment(1);
}

/// Record an upstream connection attempt.
pub fn record_connect_attempt() {
    counter!("price_stream_connect_attempts_total").increment(1);
}

/// Record an upstream WebSocket error.
pub fn record_websocket_error(error_type: &'static str) {
    counter!("price_stream_websocket_errors_total", "error_type" => error_type).increment(1);
}

/// Record handshake duration.
pub fn record_connect_duration(duration: Duration) {
    histogram!("price_stream_connect_seconds").record(duration.as_secs_f64());
}

/// Refresh state gauges from a status snapshot.
#[allow(clippy::cast_precision_loss)]
pub fn record_status(status: &StreamStatus) {
    gauge!("price_stream_connection_state").set(f64::from(status.state.as_code()));
    gauge!("price_stream_subscriptions", "set" => "desired")
        .set(status.desired_subscriptions.len() as f64);
    gauge!("price_stream_subscriptions", "set" => "active")
        .set(status.active_subscriptions.len() as f64);
    gauge!("price_stream_subscriptions", "set" => "pending")
        .set(status.pending_subscribe.len() as f64);
    gauge!("price_stream_cache_symbols").set(status.cache_size as f64);
}

// =============================================================================
// Tests
// =============================================================================
