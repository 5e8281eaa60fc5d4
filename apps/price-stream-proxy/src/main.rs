//! Price Stream Proxy Binary
//!
//! Starts the price stream proxy.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-stream-proxy
//! ```
//!
//! # Environment Variables
//!
//! ## Upstream
//! - `TWELVEDATA_API_KEY`: Twelve Data API key (without it the proxy serves
//!   HTTP but never connects)
//! - `TWELVEDATA_WS_URL`: Endpoint (default: wss://ws.twelvedata.com/v1/quotes/price)
//!
//! ## Optional
//! - `PORT`: HTTP port (default: 3001)
//! - `STREAM_HEARTBEAT_INTERVAL_SECS`: Heartbeat period (default: 10)
//! - `STREAM_RECONNECT_DELAY_MS`: Reconnect delay (default: 2000)
//! - `STREAM_RECONNECT_DELAY_MAX_MS`: Reconnect delay cap (default: 2000)
//! - `STREAM_RECONNECT_MULTIPLIER`: Backoff multiplier (default: 1.0)
//! - `STREAM_RECONNECT_JITTER`: Jitter fraction (default: 0.0)
//! - `STREAM_CONNECT_TIMEOUT_SECS`: Handshake timeout (default: 10)
//! - `STREAM_ACK_MODE`: optimistic | strict (default: optimistic)
//! - `STREAM_RESUBSCRIBE_ON_RECONNECT`: Re-send desired symbols after reconnect (default: true)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: price-stream-proxy)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use price_stream_proxy::infrastructure::http::HttpServer;
use price_stream_proxy::infrastructure::telemetry;
use price_stream_proxy::infrastructure::twelvedata::TwelveDataConnector;
use price_stream_proxy::{PriceStream, ProxyConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    #[allow(clippy::expect_used)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    let telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!(
        otlp_export = telemetry_guard.is_exporting(),
        "Starting Price Stream Proxy"
    );

    let _metrics_handle = init_metrics();

    let config = ProxyConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let stream = match &config.upstream.api_key {
        Some(api_key) => {
            let connector = TwelveDataConnector::new(config.upstream.url.clone(), api_key.clone());
            PriceStream::new(Arc::new(connector), config.stream.clone())
        }
        None => {
            tracing::warn!("TWELVEDATA_API_KEY is missing, upstream stream will not connect");
            PriceStream::inert(config.stream.clone())
        }
    };

    stream.start_stream();

    let http_server = HttpServer::new(config.server.port, stream.clone(), shutdown_token.clone());
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!(port = config.server.port, "Price stream proxy ready");

    await_shutdown(shutdown_token).await;

    stream.shutdown();
    if let Err(e) = http_task.await {
        tracing::warn!(error = %e, "HTTP server task failed");
    }

    tracing::info!("Price stream proxy stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ProxyConfig) {
    tracing::info!(
        port = config.server.port,
        upstream = %config.upstream.url,
        api_key_present = config.has_api_key(),
        ack_mode = %config.stream.ack_mode,
        "Configuration loaded"
    );
    tracing::debug!(
        heartbeat_secs = config.stream.heartbeat.interval.as_secs(),
        reconnect_ms = u64::try_from(config.stream.reconnect.initial_delay.as_millis()).unwrap_or(u64::MAX),
        reconnect_max_ms = u64::try_from(config.stream.reconnect.max_delay.as_millis()).unwrap_or(u64::MAX),
        connect_timeout_secs = config.stream.connect_timeout.as_secs(),
        resubscribe_on_reconnect = config.stream.resubscribe_on_reconnect,
        "Stream settings"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
