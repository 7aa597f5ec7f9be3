//! Metaculus adapter
//!
//! External id is a numeric question id. The community prediction arrives
//! either as a bare number or as a distribution summary whose `full.q2` is
//! the median.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{
    build_http_client, get_json, lenient_f64, validate_probability, AdapterError,
    FetchedProbability, MarketListing, SourceAdapter,
};

const QUESTION_LIMIT: &str = "100";

pub struct MetaculusAdapter {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl MetaculusAdapter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AdapterError> {
        Ok(Self {
            http_client: build_http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl SourceAdapter for MetaculusAdapter {
    fn source_key(&self) -> &'static str {
        "metaculus"
    }

    async fn fetch_probability(
        &self,
        external_id: &str,
    ) -> Result<Option<FetchedProbability>, AdapterError> {
        let question_id: u64 = external_id.trim().parse().map_err(|_| {
            AdapterError::Parse(format!("Metaculus question id is not numeric: {}", external_id))
        })?;

        let url = format!("{}/questions/{}/", self.base_url, question_id);
        debug!(question_id, "Querying Metaculus question");

        let Some(body) = get_json(self.http_client.get(&url), self.timeout).await? else {
            return Ok(None);
        };

        match community_prediction(&body) {
            Some(p) => Ok(Some(FetchedProbability {
                probability: validate_probability(p)?,
                raw_payload: Some(body),
            })),
            None => Ok(None),
        }
    }

    async fn list_markets(&self) -> Result<Vec<MarketListing>, AdapterError> {
        let url = format!("{}/questions/", self.base_url);
        let request = self
            .http_client
            .get(&url)
            .query(&[("status", "open"), ("limit", QUESTION_LIMIT)]);

        let Some(body) = get_json(request, self.timeout).await? else {
            return Ok(Vec::new());
        };

        Ok(body
            .get("results")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|q| {
                let id = q.get("id").and_then(Value::as_u64)?;
                Some(MarketListing {
                    external_id: id.to_string(),
                    title: q
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    probability: community_prediction(q).filter(|p| (0.0..=1.0).contains(p)),
                })
            })
            .collect())
    }
}

/// Community median from `community_prediction`
fn community_prediction(question: &Value) -> Option<f64> {
    match question.get("community_prediction")? {
        Value::Object(summary) => summary
            .get("full")
            .and_then(|full| full.get("q2"))
            .and_then(lenient_f64),
        other => lenient_f64(other),
    }
}
