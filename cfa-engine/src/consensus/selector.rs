//! Latest-Value Selector
//!
//! Reduces an event's observation stream to one probability per active
//! source: the observation with the greatest `observed_at`, ties broken by
//! the greatest row id (most recently inserted).

use cfa_common::db::ForecastObservation;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

/// Latest observation retained for one source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatestValue {
    pub probability: f64,
    pub observed_at: DateTime<Utc>,
    pub observation_id: i64,
}

impl LatestValue {
    fn from_observation(obs: &ForecastObservation) -> Self {
        Self {
            probability: obs.probability,
            observed_at: obs.observed_at,
            observation_id: obs.id,
        }
    }

    fn is_newer_than(&self, other: &LatestValue) -> bool {
        (self.observed_at, self.observation_id) > (other.observed_at, other.observation_id)
    }
}

/// Source id → latest value, ordered by source id
///
/// An empty mapping means no consensus is computable for the event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestValues {
    values: BTreeMap<i64, LatestValue>,
}

impl LatestValues {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn source_count(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, source_id: i64) -> Option<&LatestValue> {
        self.values.get(&source_id)
    }

    pub fn source_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.values.keys().copied()
    }

    /// Probabilities in source-id order
    pub fn probabilities(&self) -> Vec<f64> {
        self.values.values().map(|v| v.probability).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &LatestValue)> {
        self.values.iter().map(|(id, v)| (*id, v))
    }
}

impl FromIterator<(i64, LatestValue)> for LatestValues {
    fn from_iter<I: IntoIterator<Item = (i64, LatestValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Select the latest observation per active source
///
/// Input order does not matter; observations from sources outside
/// `active_sources` are dropped even when they are the most recent.
pub fn select_latest(
    observations: &[ForecastObservation],
    active_sources: &HashSet<i64>,
) -> LatestValues {
    let mut values: BTreeMap<i64, LatestValue> = BTreeMap::new();

    for obs in observations {
        if !active_sources.contains(&obs.source_id) {
            continue;
        }

        let candidate = LatestValue::from_observation(obs);
        values
            .entry(obs.source_id)
            .and_modify(|current| {
                if candidate.is_newer_than(current) {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    LatestValues { values }
}
