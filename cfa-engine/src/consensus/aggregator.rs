//! Consensus Aggregator
//!
//! Weighted-mean consensus plus raw cross-source spread.
//!
//! Disagreement is the population standard deviation of the **unweighted**
//! probabilities, so a heavily weighted outlier cannot hide disagreement.
//!
//! | Disagreement        | Tier   |
//! |---------------------|--------|
//! | `< 0.05`            | Low    |
//! | `0.05 ..< 0.15`     | Medium |
//! | `>= 0.15`           | High   |

use cfa_common::db::DisagreementTier;

/// Lower bound (inclusive) of the Medium tier
pub const MEDIUM_DISAGREEMENT_THRESHOLD: f64 = 0.05;
/// Lower bound (inclusive) of the High tier
pub const HIGH_DISAGREEMENT_THRESHOLD: f64 = 0.15;

/// Weighted mean, spread and tier for one event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub probability: f64,
    pub disagreement: f64,
    pub tier: DisagreementTier,
}

/// Σ probability × weight over paired slices
pub fn weighted_mean(probabilities: &[f64], weights: &[f64]) -> f64 {
    probabilities
        .iter()
        .zip(weights)
        .map(|(p, w)| p * w)
        .sum()
}

/// Population standard deviation (divides by N)
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

pub fn classify_disagreement(disagreement: f64) -> DisagreementTier {
    if disagreement < MEDIUM_DISAGREEMENT_THRESHOLD {
        DisagreementTier::Low
    } else if disagreement < HIGH_DISAGREEMENT_THRESHOLD {
        DisagreementTier::Medium
    } else {
        DisagreementTier::High
    }
}

/// Aggregate present-source probabilities with their normalized weights
///
/// Callers guarantee at least one source. A single source has disagreement
/// 0 and tier Low by definition.
pub fn aggregate(probabilities: &[f64], normalized_weights: &[f64]) -> Aggregate {
    debug_assert_eq!(probabilities.len(), normalized_weights.len());

    // Float error can push an exact 0/1 consensus a hair outside [0, 1]
    let probability = weighted_mean(probabilities, normalized_weights).clamp(0.0, 1.0);

    let disagreement = if probabilities.len() == 1 {
        0.0
    } else {
        population_std_dev(probabilities)
    };

    Aggregate {
        probability,
        disagreement,
        tier: classify_disagreement(disagreement),
    }
}
