//! HTTP API
//!
//! Thin axum front end over [`PriceStream`]: price polling, subscription
//! management, status, health checks and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /` - Service banner
//! - `GET /prices?symbols=AAPL,BTC/USD` - Latest cached prices
//! - `POST /subscriptions` - Subscribe, body `{"symbols":[...]}`
//! - `DELETE /subscriptions` - Unsubscribe, body `{"symbols":[...]}`
//! - `GET /ws-status` - Upstream connection and subscription status
//! - `GET /healthz` - Liveness check (simple OK)
//! - `GET /readyz` - Readiness check (upstream connected)
//! - `GET /metrics` - Prometheus metrics in text format

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::application::services::{PriceStream, StreamStatus};
use crate::domain::streaming::PriceSample;
use crate::infrastructure::metrics::{get_metrics_handle, record_status};

/// Service name reported by `GET /`.
pub const SERVICE_NAME: &str = "price-ws-backend";

// =============================================================================
// Request / Response Types
// =============================================================================

/// `GET /` response.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    /// Always `true`.
    pub ok: bool,
    /// Service name.
    pub service: &'static str,
}

/// `GET /prices` query.
#[derive(Debug, Default, Deserialize)]
pub struct PricesQuery {
    /// Comma-separated symbols.
    #[serde(default)]
    pub symbols: Option<String>,
}

/// `POST /subscriptions` response.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeResponse {
    /// Always `true`.
    pub ok: bool,
    /// Requested symbols, uppercased.
    pub subscribed: Vec<String>,
}

/// `DELETE /subscriptions` response.
#[derive(Debug, Clone, Serialize)]
pub struct UnsubscribeResponse {
    /// Always `true`.
    pub ok: bool,
    /// Requested symbols, uppercased.
    pub unsubscribed: Vec<String>,
}

/// Error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Human readable reason.
    pub error: &'static str,
}

/// Body validation failure, answered with 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyError {
    /// `symbols` missing or not an array (or the body is not JSON at all).
    NotAnArray,
    /// The array holds something other than strings or numbers.
    InvalidElement,
}

impl BodyError {
    const fn message(self) -> &'static str {
        match self {
            Self::NotAnArray => "symbols must be an array",
            Self::InvalidElement => "symbols must be an array of strings",
        }
    }
}

impl IntoResponse for BodyError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}

/// Extract the raw `symbols` array from a request body.
///
/// Numbers are accepted and stringified.
///
/// # Errors
///
/// Returns [`BodyError`] if the body is not JSON, `symbols` is not an array,
/// or an element is neither a string nor a number.
pub fn symbols_from_body(
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Vec<String>, BodyError> {
    let Ok(Json(body)) = body else {
        return Err(BodyError::NotAnArray);
    };

    let Some(items) = body.get("symbols").and_then(serde_json::Value::as_array) else {
        return Err(BodyError::NotAnArray);
    };

    items
        .iter()
        .map(|item| match item {
            serde_json::Value::String(s) => Ok(s.clone()),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            _ => Err(BodyError::InvalidElement),
        })
        .collect()
}

/// Split a `symbols` query value on commas.
#[must_use]
pub fn symbols_from_query(raw: Option<&str>) -> Vec<&str> {
    raw.map(|raw| raw.split(',').collect()).unwrap_or_default()
}

// =============================================================================
// Router
// =============================================================================

/// Build the application router.
#[must_use]
pub fn router(stream: PriceStream) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/prices", get(prices_handler))
        .route(
            "/subscriptions",
            axum::routing::post(subscribe_handler).delete(unsubscribe_handler),
        )
        .route("/ws-status", get(status_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .layer(CorsLayer::permissive())
        .with_state(stream)
}

// =============================================================================
// HTTP Server
// =============================================================================

/// HTTP server for the price API.
pub struct HttpServer {
    port: u16,
    stream: PriceStream,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server.
    #[must_use]
    pub const fn new(port: u16, stream: PriceStream, cancel: CancellationToken) -> Self {
        Self {
            port,
            stream,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let app = router(self.stream);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Price backend listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn root_handler() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        ok: true,
        service: SERVICE_NAME,
    })
}

async fn prices_handler(
    State(stream): State<PriceStream>,
    Query(query): Query<PricesQuery>,
) -> Json<BTreeMap<String, PriceSample>> {
    Json(stream.get_prices(symbols_from_query(query.symbols.as_deref())))
}

async fn subscribe_handler(
    State(stream): State<PriceStream>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<SubscribeResponse>, BodyError> {
    let symbols = symbols_from_body(body)?;
    stream.subscribe(&symbols);

    Ok(Json(SubscribeResponse {
        ok: true,
        subscribed: symbols.iter().map(|s| s.to_uppercase()).collect(),
    }))
}

async fn unsubscribe_handler(
    State(stream): State<PriceStream>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<UnsubscribeResponse>, BodyError> {
    let symbols = symbols_from_body(body)?;
    stream.unsubscribe(&symbols);

    Ok(Json(UnsubscribeResponse {
        ok: true,
        unsubscribed: symbols.iter().map(|s| s.to_uppercase()).collect(),
    }))
}

async fn status_handler(State(stream): State<PriceStream>) -> Json<StreamStatus> {
    Json(stream.get_status())
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(stream): State<PriceStream>) -> impl IntoResponse {
    if stream.is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler(State(stream): State<PriceStream>) -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            record_status(&stream.get_status());
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
