//! Adapter tests against a local fake upstream
//!
//! Each test binds an axum server on an ephemeral port and points a real
//! adapter at it.

use std::time::Duration;

use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;

use cfa_common::config::KalshiCredentials;
use cfa_engine::adapters::{
    AdapterError, ErrorKind, KalshiAdapter, MetaculusAdapter, PolymarketAdapter, PublicModelAdapter,
    SourceAdapter,
};

const TIMEOUT: Duration = Duration::from_secs(2);

/// Serve `app` on 127.0.0.1 and return its base URL
async fn spawn_upstream(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn polymarket_markets() -> Value {
    json!({
        "data": [
            {
                "condition_id": "0xabc",
                "market_slug": "will-it-rain",
                "question": "Will it rain?",
                "tokens": [
                    { "token_id": "yes-1", "outcome": "Yes", "price": 0.58 },
                    { "token_id": "no-1", "outcome": "No", "price": 0.42 }
                ]
            },
            {
                "condition_id": "0xdef",
                "question": "Will it snow?",
                "tokens": [
                    { "token_id": "yes-2", "outcome": "Yes", "price": 0.2 },
                    { "token_id": "no-2", "outcome": "No", "price": 0.6 }
                ]
            }
        ]
    })
}

async fn polymarket_book(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    match params.get("token_id").map(String::as_str) {
        Some("yes-1") => Json(json!({
            "bids": [{ "price": "0.60", "size": "10" }, { "price": "0.55", "size": "3" }],
            "asks": [{ "price": "0.64", "size": "5" }, { "price": "0.70", "size": "1" }]
        }))
        .into_response(),
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn polymarket_upstream() -> Router {
    Router::new()
        .route("/markets", get(|| async { Json(polymarket_markets()) }))
        .route("/book", get(polymarket_book))
}

#[tokio::test]
async fn test_polymarket_uses_order_book_mid() {
    let base = spawn_upstream(polymarket_upstream()).await;
    let adapter = PolymarketAdapter::new(&base, TIMEOUT).unwrap();

    let fetched = adapter.fetch_probability("will-it-rain").await.unwrap().unwrap();
    assert!((fetched.probability - 0.62).abs() < 1e-9);
    assert!(fetched.raw_payload.unwrap().get("book").is_some());
}

#[tokio::test]
async fn test_polymarket_falls_back_to_token_prices() {
    let base = spawn_upstream(polymarket_upstream()).await;
    let adapter = PolymarketAdapter::new(&base, TIMEOUT).unwrap();

    // Book request fails for this token; yes / (yes + no) = 0.2 / 0.8
    let fetched = adapter.fetch_probability("0xdef").await.unwrap().unwrap();
    assert!((fetched.probability - 0.25).abs() < 1e-9);
}

#[tokio::test]
async fn test_polymarket_unknown_market_is_absent() {
    let base = spawn_upstream(polymarket_upstream()).await;
    let adapter = PolymarketAdapter::new(&base, TIMEOUT).unwrap();

    assert!(adapter.fetch_probability("0x999").await.unwrap().is_none());

    let listed = adapter.list_markets().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].external_id, "0xabc");
}

fn kalshi_authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "Bearer key:secret")
}

async fn kalshi_market(headers: HeaderMap, Path(ticker): Path<String>) -> impl IntoResponse {
    if !kalshi_authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match ticker.as_str() {
        "RAIN-26" => Json(json!({
            "market": { "ticker": "RAIN-26", "title": "Rain", "yes_bid": 40, "yes_ask": 44 }
        }))
        .into_response(),
        "HAIL/26?early" => Json(json!({
            "market": { "ticker": "HAIL/26?early", "yes_bid": 10, "yes_ask": 12 }
        }))
        .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn kalshi_open_markets(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if !kalshi_authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if params.get("status").map(String::as_str) != Some("open") {
        return StatusCode::BAD_REQUEST.into_response();
    }

    Json(json!({
        "markets": [
            { "ticker": "RAIN-26", "title": "Rain", "yes_bid": 40, "yes_ask": 44 },
            { "ticker": "FOG-26", "title": "Fog" },
            { "title": "No ticker", "yes_bid": 50, "yes_ask": 50 }
        ]
    }))
    .into_response()
}

fn kalshi_upstream() -> Router {
    Router::new()
        .route("/markets", get(kalshi_open_markets))
        .route("/markets/:ticker", get(kalshi_market))
}

fn kalshi_credentials() -> KalshiCredentials {
    KalshiCredentials {
        api_key: "key".to_string(),
        api_secret: "secret".to_string(),
    }
}

#[tokio::test]
async fn test_kalshi_quote_mid_in_cents() {
    let base = spawn_upstream(kalshi_upstream()).await;
    let adapter = KalshiAdapter::new(&base, Some(kalshi_credentials()), TIMEOUT).unwrap();

    let fetched = adapter.fetch_probability("RAIN-26").await.unwrap().unwrap();
    assert!((fetched.probability - 0.42).abs() < 1e-9);

    assert!(adapter.fetch_probability("SNOW-26").await.unwrap().is_none());
}

#[tokio::test]
async fn test_kalshi_ticker_with_reserved_characters() {
    let base = spawn_upstream(kalshi_upstream()).await;
    let adapter = KalshiAdapter::new(&base, Some(kalshi_credentials()), TIMEOUT).unwrap();

    // Reaches the single-market route instead of /markets or a query string
    let fetched = adapter.fetch_probability("HAIL/26?early").await.unwrap().unwrap();
    assert!((fetched.probability - 0.11).abs() < 1e-9);
}

#[tokio::test]
async fn test_kalshi_lists_open_markets() {
    let base = spawn_upstream(kalshi_upstream()).await;
    let adapter = KalshiAdapter::new(&base, Some(kalshi_credentials()), TIMEOUT).unwrap();

    let listed = adapter.list_markets().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].external_id, "RAIN-26");
    assert_eq!(listed[0].title, "Rain");
    assert!((listed[0].probability.unwrap() - 0.42).abs() < 1e-9);
    assert_eq!(listed[1].external_id, "FOG-26");
    assert!(listed[1].probability.is_none());

    let anonymous = KalshiAdapter::new(&base, None, TIMEOUT).unwrap();
    let err = anonymous.list_markets().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}

#[tokio::test]
async fn test_kalshi_rejected_credentials_is_transient_error() {
    let base = spawn_upstream(kalshi_upstream()).await;
    let wrong = KalshiCredentials {
        api_key: "key".to_string(),
        api_secret: "wrong".to_string(),
    };
    let adapter = KalshiAdapter::new(&base, Some(wrong), TIMEOUT).unwrap();

    let err = adapter.fetch_probability("RAIN-26").await.unwrap_err();
    assert!(matches!(err, AdapterError::Http { status: 401, .. }));
    assert_eq!(err.kind(), ErrorKind::Transient);
}

async fn metaculus_question(Path(id): Path<u64>) -> impl IntoResponse {
    match id {
        101 => Json(json!({
            "id": 101,
            "title": "Will it rain?",
            "community_prediction": { "full": { "q1": 0.2, "q2": 0.33, "q3": 0.5 } }
        }))
        .into_response(),
        102 => Json(json!({ "id": 102, "title": "Unforecast", "community_prediction": null }))
            .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

#[tokio::test]
async fn test_metaculus_community_median() {
    let app = Router::new().route("/questions/:id/", get(metaculus_question));
    let base = spawn_upstream(app).await;
    let adapter = MetaculusAdapter::new(&base, TIMEOUT).unwrap();

    let fetched = adapter.fetch_probability("101").await.unwrap().unwrap();
    assert!((fetched.probability - 0.33).abs() < 1e-9);

    assert!(adapter.fetch_probability("102").await.unwrap().is_none());
    assert!(adapter.fetch_probability("103").await.unwrap().is_none());
}

async fn metaculus_open_questions(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    if params.get("status").map(String::as_str) != Some("open") {
        return StatusCode::BAD_REQUEST.into_response();
    }

    Json(json!({
        "results": [
            { "id": 101, "title": "Will it rain?", "community_prediction": 0.33 },
            {
                "id": 104,
                "title": "Will it hail?",
                "community_prediction": { "full": { "q1": 0.05, "q2": 0.1, "q3": 0.2 } }
            },
            { "id": 105, "title": "Bad median", "community_prediction": 1.7 },
            { "title": "No id", "community_prediction": 0.5 }
        ]
    }))
    .into_response()
}

#[tokio::test]
async fn test_metaculus_lists_open_questions() {
    let app = Router::new().route("/questions/", get(metaculus_open_questions));
    let base = spawn_upstream(app).await;
    let adapter = MetaculusAdapter::new(&base, TIMEOUT).unwrap();

    let listed = adapter.list_markets().await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|m| m.external_id.as_str()).collect();
    assert_eq!(ids, vec!["101", "104", "105"]);
    assert_eq!(listed[0].title, "Will it rain?");
    assert_eq!(listed[0].probability, Some(0.33));
    assert_eq!(listed[1].probability, Some(0.1));
    assert!(listed[2].probability.is_none());
}

#[tokio::test]
async fn test_public_model_reads_data_attribute() {
    let app = Router::new()
        .route(
            "/forecast-2026",
            get(|| async {
                Html(r#"<html><body><div class="chance" data-probability="71%">71 in 100</div></body></html>"#)
            }),
        )
        .route("/broken", get(|| async { StatusCode::BAD_GATEWAY }));
    let base = spawn_upstream(app).await;
    let adapter = PublicModelAdapter::new(&base, TIMEOUT).unwrap();

    let fetched = adapter.fetch_probability("forecast-2026").await.unwrap().unwrap();
    assert!((fetched.probability - 0.71).abs() < 1e-9);

    assert!(adapter.fetch_probability("missing").await.unwrap().is_none());

    let err = adapter.fetch_probability("broken").await.unwrap_err();
    assert!(matches!(err, AdapterError::Http { status: 502, .. }));
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let app = Router::new().route(
        "/questions/:id/",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({ "community_prediction": 0.5 }))
        }),
    );
    let base = spawn_upstream(app).await;
    let adapter = MetaculusAdapter::new(&base, Duration::from_millis(200)).unwrap();

    let err = adapter.fetch_probability("7").await.unwrap_err();
    assert!(matches!(err, AdapterError::Timeout(_)));
    assert_eq!(err.kind(), ErrorKind::Transient);
}
