//! Weight Normalizer
//!
//! Maps each present source to its configured weight (1.0 when none is
//! configured) and rescales the set to sum to 1. A set whose weights sum to
//! zero falls back to equal weighting.

use std::collections::HashMap;

use super::ConsensusError;

/// Weight used for a present source with no configured weight
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Collect configured weights for exactly the given sources, in order
///
/// Negative or non-finite weights are malformed data, not something to
/// coerce.
pub fn collect_weights(
    source_ids: impl IntoIterator<Item = i64>,
    configured: &HashMap<i64, f64>,
) -> Result<Vec<f64>, ConsensusError> {
    source_ids
        .into_iter()
        .map(|source_id| {
            let weight = configured.get(&source_id).copied().unwrap_or(DEFAULT_WEIGHT);
            if !weight.is_finite() || weight < 0.0 {
                Err(ConsensusError::InvalidWeight { source_id, weight })
            } else {
                Ok(weight)
            }
        })
        .collect()
}

/// Rescale non-negative weights to sum to 1
///
/// Zero total → equal weights. Empty input → empty output. Weights are
/// divided by the largest one first, so the sum stays finite for any finite
/// input.
pub fn normalize_weights(weights: &[f64]) -> Vec<f64> {
    if weights.is_empty() {
        return Vec::new();
    }

    let max = weights.iter().copied().fold(0.0, f64::max);
    if max <= 0.0 {
        let equal = 1.0 / weights.len() as f64;
        return vec![equal; weights.len()];
    }

    let scaled: Vec<f64> = weights.iter().map(|w| w / max).collect();
    let total: f64 = scaled.iter().sum();
    scaled.iter().map(|w| w / total).collect()
}
