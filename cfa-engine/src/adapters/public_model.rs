//! Public forecasting model adapter (HTML scrape)
//!
//! Fetches `<base_url>/<external_id>` and reads the first
//! `data-probability` attribute on the page. Values above 1 and up to 100
//! are percentages.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{build_http_client, validate_probability, AdapterError, FetchedProbability, SourceAdapter};

const PROBABILITY_ATTRIBUTE: &str = "data-probability=";

pub struct PublicModelAdapter {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl PublicModelAdapter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self {
            http_client: build_http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl SourceAdapter for PublicModelAdapter {
    fn source_key(&self) -> &'static str {
        "public_model"
    }

    async fn fetch_probability(
        &self,
        external_id: &str,
    ) -> Result<Option<FetchedProbability>, AdapterError> {
        let url = format!("{}/{}", self.base_url, external_id.trim_start_matches('/'));
        debug!(url = %url, "Fetching public model page");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AdapterError::Http {
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| AdapterError::from_reqwest(e, self.timeout))?;

        let Some(raw) = first_probability_attribute(&html) else {
            return Ok(None);
        };

        let probability = parse_probability(raw)?;
        Ok(Some(FetchedProbability {
            probability,
            raw_payload: Some(json!({ "url": url, "data_probability": raw })),
        }))
    }
}

/// Value of the first `data-probability="…"` (or single-quoted) attribute
fn first_probability_attribute(html: &str) -> Option<&str> {
    let start = html.find(PROBABILITY_ATTRIBUTE)? + PROBABILITY_ATTRIBUTE.len();
    let rest = &html[start..];

    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[1..];
    let end = value.find(quote)?;
    Some(value[..end].trim())
}

/// Fraction, or percentage when above 1
fn parse_probability(raw: &str) -> Result<f64, AdapterError> {
    let value: f64 = raw
        .trim_end_matches('%')
        .trim()
        .parse()
        .map_err(|_| AdapterError::Parse(format!("data-probability is not a number: {}", raw)))?;

    let scaled = if value > 1.0 && value <= 100.0 {
        value / 100.0
    } else {
        value
    };
    validate_probability(scaled)
}
