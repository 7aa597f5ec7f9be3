//! Kalshi trading API adapter
//!
//! External id is a market ticker. Quotes are in cents, so the probability is
//! `(yes_bid + yes_ask) / 2 / 100`. Requires credentials; without them the
//! adapter reports itself unavailable and never issues a request.

use std::time::Duration;

use async_trait::async_trait;
use cfa_common::config::KalshiCredentials;
use serde_json::Value;
use tracing::debug;

use super::{
    build_http_client, get_json, lenient_f64, validate_probability, AdapterError,
    FetchedProbability, MarketListing, SourceAdapter,
};

/// Kalshi quotes prices on a 0–100 cent scale
const CENTS_PER_UNIT: f64 = 100.0;

pub struct KalshiAdapter {
    http_client: reqwest::Client,
    base_url: String,
    credentials: Option<KalshiCredentials>,
    timeout: Duration,
}

impl KalshiAdapter {
    pub fn new(
        base_url: &str,
        credentials: Option<KalshiCredentials>,
        timeout: Duration,
    ) -> Result<Self, AdapterError> {
        Ok(Self {
            http_client: build_http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            timeout,
        })
    }

    /// `{base}/markets/{ticker}` with the ticker escaped as a single path segment
    fn market_url(&self, ticker: &str) -> Result<reqwest::Url, AdapterError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| AdapterError::NotConfigured(format!("Invalid Kalshi base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AdapterError::NotConfigured("Kalshi base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .push("markets")
            .push(ticker);
        Ok(url)
    }

    fn authorized_get(&self, url: reqwest::Url) -> Result<reqwest::RequestBuilder, AdapterError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| AdapterError::NotConfigured("Kalshi credentials missing".to_string()))?;

        Ok(self
            .http_client
            .get(url)
            .bearer_auth(format!("{}:{}", creds.api_key, creds.api_secret)))
    }
}

#[async_trait]
impl SourceAdapter for KalshiAdapter {
    fn source_key(&self) -> &'static str {
        "kalshi"
    }

    fn is_available(&self) -> bool {
        self.credentials.is_some()
    }

    async fn fetch_probability(
        &self,
        external_id: &str,
    ) -> Result<Option<FetchedProbability>, AdapterError> {
        let url = self.market_url(external_id)?;
        debug!(ticker = %external_id, "Querying Kalshi market");

        let Some(body) = get_json(self.authorized_get(url)?, self.timeout).await? else {
            return Ok(None);
        };

        match quote_mid(market_body(&body)) {
            Some(p) => Ok(Some(FetchedProbability {
                probability: validate_probability(p)?,
                raw_payload: Some(body),
            })),
            None => Ok(None),
        }
    }

    async fn list_markets(&self) -> Result<Vec<MarketListing>, AdapterError> {
        let url = reqwest::Url::parse(&format!("{}/markets", self.base_url))
            .map_err(|e| AdapterError::NotConfigured(format!("Invalid Kalshi base URL: {}", e)))?;
        let request = self.authorized_get(url)?.query(&[("status", "open")]);

        let Some(body) = get_json(request, self.timeout).await? else {
            return Ok(Vec::new());
        };

        Ok(body
            .get("markets")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|m| {
                Some(MarketListing {
                    external_id: m.get("ticker").and_then(Value::as_str)?.to_string(),
                    title: m
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    probability: quote_mid(m).filter(|p| (0.0..=1.0).contains(p)),
                })
            })
            .collect())
    }
}

/// Single-market responses may wrap the market in `{ "market": {...} }`
fn market_body(body: &Value) -> &Value {
    body.get("market").filter(|m| m.is_object()).unwrap_or(body)
}

/// Mid of yes bid and yes ask, converted from cents
fn quote_mid(market: &Value) -> Option<f64> {
    let yes_bid = market.get("yes_bid").and_then(lenient_f64)?;
    let yes_ask = market.get("yes_ask").and_then(lenient_f64)?;
    Some((yes_bid + yes_ask) / 2.0 / CENTS_PER_UNIT)
}
