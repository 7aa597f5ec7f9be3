//! Polymarket CLOB adapter
//!
//! External id is a market's condition id, slug, or question id. The market
//! is located in the active-markets listing, then priced from the "Yes"
//! token's order book (mid of best bid and best ask). When the book is empty
//! or unreachable the token prices are used instead, normalized as
//! `yes / (yes + no)`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    build_http_client, get_json, lenient_f64, validate_probability, AdapterError,
    FetchedProbability, MarketListing, SourceAdapter,
};

const MARKET_LIMIT: &str = "100";

pub struct PolymarketAdapter {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl PolymarketAdapter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self {
            http_client: build_http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    async fn fetch_active_markets(&self) -> Result<Vec<Value>, AdapterError> {
        let url = format!("{}/markets", self.base_url);
        debug!(url = %url, "Fetching Polymarket markets");

        let request = self
            .http_client
            .get(&url)
            .query(&[("active", "true"), ("limit", MARKET_LIMIT)]);

        match get_json(request, self.timeout).await? {
            Some(body) => Ok(market_list(body)),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_order_book(&self, token_id: &str) -> Result<Option<Value>, AdapterError> {
        let url = format!("{}/book", self.base_url);
        let request = self.http_client.get(&url).query(&[("token_id", token_id)]);
        get_json(request, self.timeout).await
    }
}

#[async_trait]
impl SourceAdapter for PolymarketAdapter {
    fn source_key(&self) -> &'static str {
        "polymarket"
    }

    async fn fetch_probability(
        &self,
        external_id: &str,
    ) -> Result<Option<FetchedProbability>, AdapterError> {
        let markets = self.fetch_active_markets().await?;

        let Some(market) = find_market(&markets, external_id) else {
            debug!(external_id = %external_id, "Polymarket market not listed");
            return Ok(None);
        };

        if let Some(token_id) = yes_token(market).and_then(|t| t.get("token_id")).and_then(Value::as_str) {
            match self.fetch_order_book(token_id).await {
                Ok(Some(book)) => {
                    if let Some(mid) = order_book_mid(&book) {
                        return Ok(Some(FetchedProbability {
                            probability: validate_probability(mid)?,
                            raw_payload: Some(json!({ "market": market, "book": book })),
                        }));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(external_id = %external_id, error = %e, "Order book unavailable, using token prices");
                }
            }
        }

        match token_price_ratio(market) {
            Some(p) => Ok(Some(FetchedProbability {
                probability: validate_probability(p)?,
                raw_payload: Some(json!({ "market": market })),
            })),
            None => Ok(None),
        }
    }

    async fn list_markets(&self) -> Result<Vec<MarketListing>, AdapterError> {
        let markets = self.fetch_active_markets().await?;

        Ok(markets
            .iter()
            .filter_map(|m| {
                let external_id = m.get("condition_id").and_then(Value::as_str)?;
                Some(MarketListing {
                    external_id: external_id.to_string(),
                    title: m
                        .get("question")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    probability: token_price_ratio(m).filter(|p| (0.0..=1.0).contains(p)),
                })
            })
            .collect())
    }
}

/// Listing body is either `{ "data": [...] }` or a bare array
fn market_list(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn find_market<'a>(markets: &'a [Value], external_id: &str) -> Option<&'a Value> {
    markets.iter().find(|m| {
        ["condition_id", "market_slug", "question_id"]
            .iter()
            .any(|field| id_matches(m.get(*field), external_id))
    })
}

fn id_matches(field: Option<&Value>, external_id: &str) -> bool {
    match field {
        Some(Value::String(s)) => s == external_id,
        Some(Value::Number(n)) => n.to_string() == external_id,
        _ => false,
    }
}

fn tokens(market: &Value) -> &[Value] {
    market
        .get("tokens")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Token whose outcome is "Yes"; the first token otherwise
fn yes_token(market: &Value) -> Option<&Value> {
    let tokens = tokens(market);
    tokens
        .iter()
        .find(|t| outcome_is(t, "yes"))
        .or_else(|| tokens.first())
}

fn outcome_is(token: &Value, outcome: &str) -> bool {
    token
        .get("outcome")
        .and_then(Value::as_str)
        .is_some_and(|o| o.eq_ignore_ascii_case(outcome))
}

/// Mid of highest bid and lowest ask; `None` unless both sides have orders
fn order_book_mid(book: &Value) -> Option<f64> {
    let best_bid = side_prices(book, "bids").reduce(f64::max)?;
    let best_ask = side_prices(book, "asks").reduce(f64::min)?;
    Some((best_bid + best_ask) / 2.0)
}

/// Level prices from `[{ "price": "0.52", ... }]` or `[["0.52", "100"]]`
fn side_prices<'a>(book: &'a Value, side: &str) -> impl Iterator<Item = f64> + 'a {
    book.get(side)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|level| match level {
            Value::Array(pair) => pair.first().and_then(lenient_f64),
            other => other.get("price").and_then(lenient_f64),
        })
}

/// `yes / (yes + no)` from token prices
fn token_price_ratio(market: &Value) -> Option<f64> {
    let tokens = tokens(market);
    if tokens.len() < 2 {
        return None;
    }

    let yes = tokens.iter().find(|t| outcome_is(t, "yes")).unwrap_or(&tokens[0]);
    let no = tokens.iter().find(|t| outcome_is(t, "no")).unwrap_or(&tokens[1]);

    let yes_price = yes.get("price").and_then(lenient_f64)?;
    let no_price = no.get("price").and_then(lenient_f64)?;
    let total = yes_price + no_price;

    (total > 0.0).then(|| yes_price / total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_markets() -> Vec<Value> {
        market_list(json!({
            "data": [
                {
                    "condition_id": "0xabc",
                    "market_slug": "will-it-rain",
                    "question_id": "0xq1",
                    "question": "Will it rain?",
                    "tokens": [
                        { "token_id": "111", "outcome": "Yes", "price": 0.62 },
                        { "token_id": "222", "outcome": "No", "price": 0.40 }
                    ]
                },
                {
                    "condition_id": "0xdef",
                    "market_slug": "no-prices",
                    "question": "Unpriced",
                    "tokens": []
                }
            ]
        }))
    }

    #[test]
    fn test_market_list_shapes() {
        assert_eq!(market_list(json!([{ "a": 1 }])).len(), 1);
        assert_eq!(sample_markets().len(), 2);
        assert!(market_list(json!({ "unexpected": true })).is_empty());
    }

    #[test]
    fn test_find_market_by_any_id() {
        let markets = sample_markets();
        for id in ["0xabc", "will-it-rain", "0xq1"] {
            let found = find_market(&markets, id).unwrap();
            assert_eq!(found["question"], "Will it rain?");
        }
        assert!(find_market(&markets, "missing").is_none());
    }

    #[test]
    fn test_yes_token_selected() {
        let markets = sample_markets();
        let token = yes_token(&markets[0]).unwrap();
        assert_eq!(token["token_id"], "111");
    }

    #[test]
    fn test_order_book_mid_uses_best_levels() {
        // Levels are not guaranteed to be sorted best-first
        let book = json!({
            "bids": [{ "price": "0.40", "size": "10" }, { "price": "0.55", "size": "3" }],
            "asks": [{ "price": "0.70", "size": "1" }, { "price": "0.59", "size": "8" }]
        });
        let mid = order_book_mid(&book).unwrap();
        assert!((mid - 0.57).abs() < 1e-12);
    }

    #[test]
    fn test_order_book_pair_levels() {
        let book = json!({ "bids": [["0.30", "5"]], "asks": [["0.34", "5"]] });
        assert!((order_book_mid(&book).unwrap() - 0.32).abs() < 1e-12);
    }

    #[test]
    fn test_one_sided_book_has_no_mid() {
        let book = json!({ "bids": [{ "price": "0.4" }], "asks": [] });
        assert!(order_book_mid(&book).is_none());
    }

    #[test]
    fn test_token_price_ratio() {
        let markets = sample_markets();
        let p = token_price_ratio(&markets[0]).unwrap();
        assert!((p - 0.62 / 1.02).abs() < 1e-12);
    }

    #[test]
    fn test_unpriced_market_is_absent() {
        let markets = sample_markets();
        assert!(token_price_ratio(&markets[1]).is_none());
    }
}
