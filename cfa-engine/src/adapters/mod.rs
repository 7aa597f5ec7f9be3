//! Source adapters
//!
//! One implementation of [`SourceAdapter`] per forecasting provider. An
//! adapter turns a provider-specific external id into a probability in
//! `[0, 1]`, reports `Ok(None)` when the provider genuinely has no data for
//! that id, and returns an [`AdapterError`] for anything that went wrong on
//! the way. Adapters never touch storage.
//!
//! Dispatch goes through [`AdapterRegistry`], keyed by the source's `key`
//! column.

pub mod kalshi;
pub mod metaculus;
pub mod polymarket;
pub mod public_model;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cfa_common::config::{resolve_kalshi_credentials, SourcesConfig};
use serde::Serialize;
use thiserror::Error;

pub use kalshi::KalshiAdapter;
pub use metaculus::MetaculusAdapter;
pub use polymarket::PolymarketAdapter;
pub use public_model::PublicModelAdapter;

const USER_AGENT: &str = concat!("cfa-engine/", env!("CARGO_PKG_VERSION"));

/// How the coordinator should treat an adapter failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Log, skip this source for this cycle, no retry
    Transient,
    /// Adapter cannot run at all (missing credentials); treat as absent
    Unavailable,
}

/// Adapter failure
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Adapter not configured: {0}")]
    NotConfigured(String),
}

impl AdapterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::NotConfigured(_) => ErrorKind::Unavailable,
            _ => ErrorKind::Transient,
        }
    }

    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout(timeout)
        } else if err.is_decode() {
            AdapterError::Parse(err.to_string())
        } else {
            AdapterError::Network(err.to_string())
        }
    }
}

/// Probability plus the payload it was derived from
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedProbability {
    pub probability: f64,
    pub raw_payload: Option<serde_json::Value>,
}

/// Market offered by a provider, for event discovery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketListing {
    pub external_id: String,
    pub title: String,
    pub probability: Option<f64>,
}

/// Fetch a current probability from one provider
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source key this adapter serves (matches `sources.key`)
    fn source_key(&self) -> &'static str;

    /// False when required credentials are missing
    fn is_available(&self) -> bool {
        true
    }

    /// Current probability for `external_id`
    ///
    /// `Ok(None)` means the provider has no data for this id. That is not an
    /// error.
    async fn fetch_probability(
        &self,
        external_id: &str,
    ) -> Result<Option<FetchedProbability>, AdapterError>;

    /// Markets currently offered by the provider
    async fn list_markets(&self) -> Result<Vec<MarketListing>, AdapterError> {
        Ok(Vec::new())
    }
}

/// Reject anything that is not a finite probability
pub fn validate_probability(value: f64) -> Result<f64, AdapterError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(AdapterError::Parse(format!("probability out of range: {}", value)))
    }
}

/// Read a JSON number, or a string holding one
pub(crate) fn lenient_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Shared HTTP client settings for all adapters
pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AdapterError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| AdapterError::Network(e.to_string()))
}

/// GET `url` and decode JSON; 404 becomes `Ok(None)`
pub(crate) async fn get_json(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<Option<serde_json::Value>, AdapterError> {
    let response = request
        .send()
        .await
        .map_err(|e| AdapterError::from_reqwest(e, timeout))?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AdapterError::Http {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map(Some)
        .map_err(|e| AdapterError::Parse(e.to_string()))
}

/// Source key → adapter
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the four built-in providers
    pub fn from_config(sources: &SourcesConfig, timeout: Duration) -> Result<Self, AdapterError> {
        let mut registry = Self::new();

        registry.register(Arc::new(PolymarketAdapter::new(
            &sources.polymarket_base_url,
            timeout,
        )?));
        registry.register(Arc::new(KalshiAdapter::new(
            &sources.kalshi_base_url,
            resolve_kalshi_credentials(sources),
            timeout,
        )?));
        registry.register(Arc::new(MetaculusAdapter::new(
            &sources.metaculus_base_url,
            timeout,
        )?));
        registry.register(Arc::new(PublicModelAdapter::new(
            &sources.public_model_base_url,
            timeout,
        )?));

        Ok(registry)
    }

    /// Add or replace the adapter for its source key
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.source_key().to_string(), adapter);
    }

    pub fn get(&self, source_key: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(source_key).cloned()
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_probability() {
        assert_eq!(validate_probability(0.0).unwrap(), 0.0);
        assert_eq!(validate_probability(1.0).unwrap(), 1.0);
        assert!(validate_probability(1.01).is_err());
        assert!(validate_probability(-0.1).is_err());
        assert!(validate_probability(f64::NAN).is_err());
        assert!(validate_probability(f64::INFINITY).is_err());
    }

    #[test]
    fn test_lenient_f64() {
        assert_eq!(lenient_f64(&json!(0.42)), Some(0.42));
        assert_eq!(lenient_f64(&json!("0.42")), Some(0.42));
        assert_eq!(lenient_f64(&json!(" 7 ")), Some(7.0));
        assert_eq!(lenient_f64(&json!("n/a")), None);
        assert_eq!(lenient_f64(&json!(null)), None);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(AdapterError::Network("reset".into()).kind(), ErrorKind::Transient);
        assert_eq!(AdapterError::Timeout(Duration::from_secs(1)).kind(), ErrorKind::Transient);
        assert_eq!(
            AdapterError::Http { status: 500, body: String::new() }.kind(),
            ErrorKind::Transient
        );
        assert_eq!(AdapterError::NotConfigured("kalshi".into()).kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn test_registry_from_default_config() {
        let registry =
            AdapterRegistry::from_config(&SourcesConfig::default(), Duration::from_secs(5)).unwrap();

        assert_eq!(registry.keys(), vec!["kalshi", "metaculus", "polymarket", "public_model"]);
        assert!(registry.get("polymarket").is_some());
        assert!(registry.get("unknown").is_none());
    }
}
