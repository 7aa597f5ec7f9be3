//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// External forecasting provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    /// Stable machine name that selects the adapter (e.g. "polymarket")
    pub key: String,
    pub display_name: String,
    /// Configured weight for consensus (non-negative)
    pub weight: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Real-world proposition being forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub resolution_date: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub outcome: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Source id → source-specific identifier
    #[serde(default)]
    pub external_ids: BTreeMap<i64, String>,
}

/// Event fields supplied by the bootstrap process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub resolution_date: Option<DateTime<Utc>>,
}

/// One timestamped probability from one source for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastObservation {
    /// Insertion order; breaks ties between equal timestamps
    pub id: i64,
    pub event_id: i64,
    pub source_id: i64,
    pub probability: f64,
    pub observed_at: DateTime<Utc>,
    pub raw_payload: Option<String>,
}

/// Observation not yet appended to the store
#[derive(Debug, Clone, PartialEq)]
pub struct NewObservation {
    pub event_id: i64,
    pub source_id: i64,
    pub probability: f64,
    pub observed_at: DateTime<Utc>,
    pub raw_payload: Option<String>,
}

/// Cross-source disagreement band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisagreementTier {
    Low,
    Medium,
    High,
}

impl DisagreementTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisagreementTier::Low => "Low",
            DisagreementTier::Medium => "Medium",
            DisagreementTier::High => "High",
        }
    }
}

impl fmt::Display for DisagreementTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisagreementTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(DisagreementTier::Low),
            "Medium" => Ok(DisagreementTier::Medium),
            "High" => Ok(DisagreementTier::High),
            other => Err(Error::Internal(format!("Unknown disagreement tier: {}", other))),
        }
    }
}

/// Current best estimate for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusSnapshot {
    pub event_id: i64,
    pub probability: f64,
    pub disagreement: f64,
    pub disagreement_label: DisagreementTier,
    pub confidence_interval_lower: f64,
    pub confidence_interval_upper: f64,
    pub source_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `updated_at` before the most recent overwrite
    pub previous_updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_label_round_trip() {
        for tier in [DisagreementTier::Low, DisagreementTier::Medium, DisagreementTier::High] {
            assert_eq!(tier.as_str().parse::<DisagreementTier>().unwrap(), tier);
        }
    }

    #[test]
    fn test_tier_rejects_unknown_label() {
        assert!("Extreme".parse::<DisagreementTier>().is_err());
    }

    #[test]
    fn test_tier_serializes_as_label() {
        let json = serde_json::to_string(&DisagreementTier::Medium).unwrap();
        assert_eq!(json, "\"Medium\"");
    }
}
