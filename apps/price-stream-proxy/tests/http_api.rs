//! HTTP API Integration Tests
//!
//! Exercises the axum router in-process with `tower::ServiceExt::oneshot`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use test_case::test_case;
use tower::ServiceExt;

use common::{next_session, settings, settle, stream_with, symbols, wait_for_state};
use price_stream_proxy::{ConnectionState, PriceStream, init_metrics, router};

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn json_request(method: Method, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn inert() -> PriceStream {
    PriceStream::inert(settings())
}

// =============================================================================
// Banner and Health Checks
// =============================================================================

#[tokio::test]
async fn test_root_banner() {
    let (status, body) = get_json(router(inert()), "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "service": "price-ws-backend"}));
}

#[tokio::test]
async fn test_liveness_always_ok() {
    let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let (status, body) = send(router(inert()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn test_readiness_follows_upstream() {
    let request = || Request::builder().uri("/readyz").body(Body::empty()).unwrap();

    let (status, _) = send(router(inert()), request()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (stream, _connector, mut sessions) = stream_with(settings());
    stream.start_stream();
    let _upstream = next_session(&mut sessions).await;
    wait_for_state(&stream, ConnectionState::Connected).await;

    let (status, body) = send(router(stream), request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"READY");
}

#[tokio::test]
async fn test_metrics_rendered_after_init() {
    init_metrics();
    let stream = inert();
    stream.subscribe(["AAPL"]);

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (status, body) = send(router(stream), request).await;
    let text = String::from_utf8(body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("price_stream_connection_state"));
    assert!(text.contains("price_stream_subscriptions"));
}

// =============================================================================
// Prices
// =============================================================================

#[tokio::test]
async fn test_prices_only_include_observed_symbols() {
    let (stream, _connector, mut sessions) = stream_with(settings());
    stream.subscribe(["AAPL"]);
    let mut upstream = next_session(&mut sessions).await;
    upstream.next_control().await;
    upstream.push(r#"{"event":"price","symbol":"AAPL","price":198.34,"timestamp":1735659932}"#);
    settle().await;

    let (status, body) = get_json(router(stream), "/prices?symbols=aapl,ZZZZ").await;

    assert_eq!(status, StatusCode::OK);
    let prices = body.as_object().unwrap();
    assert_eq!(prices.len(), 1);
    assert_eq!(body["AAPL"]["symbol"], "AAPL");
    assert_eq!(body["AAPL"]["price"], 198.34);
    assert_eq!(body["AAPL"]["sourceTimestamp"], 1_735_659_932);
    assert!(body["AAPL"]["observedAt"].is_i64());
}

#[test_case("/prices" ; "no query")]
#[test_case("/prices?symbols=" ; "empty list")]
#[test_case("/prices?symbols=,%20," ; "only blanks")]
#[tokio::test]
async fn test_prices_without_symbols_is_empty(uri: &str) {
    let (status, body) = get_json(router(inert()), uri).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
}

// =============================================================================
// Subscriptions
// =============================================================================

#[tokio::test]
async fn test_subscribe_records_symbols() {
    let stream = inert();
    let request = json_request(
        Method::POST,
        "/subscriptions",
        r#"{"symbols":["aapl","btc/usd"]}"#,
    );

    let (status, body) = send(router(stream.clone()), request).await;
    let body: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "subscribed": ["AAPL", "BTC/USD"]}));
    assert_eq!(
        stream.get_status().pending_subscribe,
        symbols(&["AAPL", "BTC/USD"])
    );
}

#[tokio::test]
async fn test_unsubscribe_removes_symbols() {
    let stream = inert();
    stream.subscribe(["AAPL", "MSFT"]);
    let request = json_request(Method::DELETE, "/subscriptions", r#"{"symbols":["msft"]}"#);

    let (status, body) = send(router(stream.clone()), request).await;
    let body: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "unsubscribed": ["MSFT"]}));
    assert_eq!(stream.get_status().desired_subscriptions, symbols(&["AAPL"]));
}

#[test_case(r#"{"symbols":"AAPL"}"#, "symbols must be an array" ; "string instead of array")]
#[test_case(r"{}", "symbols must be an array" ; "missing field")]
#[test_case(r#"{"symbols":["AAPL""#, "symbols must be an array" ; "truncated json")]
#[test_case(r#"{"symbols":["AAPL",{"x":1}]}"#, "symbols must be an array of strings" ; "object element")]
#[test_case(r#"{"symbols":[null]}"#, "symbols must be an array of strings" ; "null element")]
#[tokio::test]
async fn test_subscribe_rejects_bad_body(body: &str, message: &str) {
    let stream = inert();

    for method in [Method::POST, Method::DELETE] {
        let request = json_request(method, "/subscriptions", body);
        let (status, response) = send(router(stream.clone()), request).await;
        let response: Value = serde_json::from_slice(&response).unwrap();

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response, json!({"error": message}));
    }

    assert!(stream.get_status().desired_subscriptions.is_empty());
}

#[tokio::test]
async fn test_subscribe_without_content_type_is_rejected() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/subscriptions")
        .body(Body::from(r#"{"symbols":["AAPL"]}"#))
        .unwrap();

    let (status, _) = send(router(inert()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Status
// =============================================================================

#[tokio::test]
async fn test_ws_status_before_connecting() {
    let stream = inert();
    stream.subscribe(["msft", "aapl"]);

    let (status, body) = get_json(router(stream), "/ws-status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], false);
    assert_eq!(body["connecting"], false);
    assert_eq!(body["state"], "disconnected");
    assert_eq!(body["pendingSubscribe"], json!(["AAPL", "MSFT"]));
    assert_eq!(body["activeSubscriptions"], json!([]));
    assert_eq!(body["cacheSize"], 0);
    assert_eq!(body["ackMode"], "optimistic");
    assert!(body["sessionStartedAt"].is_null());
}

#[tokio::test]
async fn test_ws_status_when_connected() {
    let (stream, _connector, mut sessions) = stream_with(settings());
    stream.subscribe(["AAPL"]);
    let mut upstream = next_session(&mut sessions).await;
    upstream.next_control().await;
    wait_for_state(&stream, ConnectionState::Connected).await;

    let (_, body) = get_json(router(stream), "/ws-status").await;

    assert_eq!(body["connected"], true);
    assert_eq!(body["state"], "connected");
    assert_eq!(body["activeSubscriptions"], json!(["AAPL"]));
    assert_eq!(body["pendingSubscribe"], json!([]));
    assert!(body["sessionId"].is_string());
    assert!(body["sessionStartedAt"].is_i64());
}
