//! Scripted adapter for coordinator tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cfa_engine::adapters::{AdapterError, FetchedProbability, SourceAdapter};

#[derive(Debug, Clone)]
pub enum MockResponse {
    Probability(f64),
    Absent,
    Fail,
    /// Sleep, then answer with the probability
    Slow(Duration, f64),
}

pub struct MockAdapter {
    key: &'static str,
    available: bool,
    responses: HashMap<String, MockResponse>,
    calls: AtomicUsize,
}

impl MockAdapter {
    pub fn new(key: &'static str) -> Self {
        Self {
            key,
            available: true,
            responses: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn respond(mut self, external_id: &str, response: MockResponse) -> Self {
        self.responses.insert(external_id.to_string(), response);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn source_key(&self) -> &'static str {
        self.key
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn fetch_probability(
        &self,
        external_id: &str,
    ) -> Result<Option<FetchedProbability>, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let fetched = |probability| {
            Ok(Some(FetchedProbability {
                probability,
                raw_payload: Some(serde_json::json!({ "mock": self.key, "id": external_id })),
            }))
        };

        match self.responses.get(external_id).cloned().unwrap_or(MockResponse::Absent) {
            MockResponse::Probability(p) => fetched(p),
            MockResponse::Absent => Ok(None),
            MockResponse::Fail => Err(AdapterError::Http {
                status: 503,
                body: "unavailable".to_string(),
            }),
            MockResponse::Slow(delay, p) => {
                tokio::time::sleep(delay).await;
                fetched(p)
            }
        }
    }
}
