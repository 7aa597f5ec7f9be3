//! Consensus computation
//!
//! Pure, synchronous pipeline run once per event after its fetches finish:
//!
//! ```text
//! observations ─► select_latest ─► collect/normalize weights
//!                                        │
//!                          aggregate ◄───┴───► estimate_interval
//!                              │                    │
//!                              └──► ConsensusEstimate ◄┘
//! ```
//!
//! Nothing here touches storage or the network.

pub mod aggregator;
pub mod interval;
pub mod selector;
pub mod weights;

use std::collections::HashMap;

use cfa_common::db::DisagreementTier;
use rand::Rng;
use thiserror::Error;

pub use aggregator::{aggregate, classify_disagreement, Aggregate};
pub use interval::{estimate_interval, BootstrapSettings, ConfidenceInterval};
pub use selector::{select_latest, LatestValue, LatestValues};
pub use weights::{collect_weights, normalize_weights};

/// Aggregation computation fault
///
/// Raised for malformed stored data. The affected event keeps its previous
/// snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsensusError {
    #[error("Invalid probability {probability} from source {source_id}")]
    InvalidProbability { source_id: i64, probability: f64 },

    #[error("Invalid weight {weight} for source {source_id}")]
    InvalidWeight { source_id: i64, weight: f64 },
}

/// Everything a snapshot needs, before it is stamped and stored
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusEstimate {
    pub probability: f64,
    pub disagreement: f64,
    pub tier: DisagreementTier,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub source_count: usize,
}

/// Run weights → aggregate → interval over an event's latest values
///
/// Returns `Ok(None)` when no source has data (nothing to store).
///
/// The stored interval always brackets the consensus: a bootstrap bound that
/// falls on the wrong side of the weighted mean is widened to meet it.
pub fn compute_consensus<R: Rng + ?Sized>(
    latest: &LatestValues,
    configured_weights: &HashMap<i64, f64>,
    settings: &BootstrapSettings,
    rng: &mut R,
) -> Result<Option<ConsensusEstimate>, ConsensusError> {
    if latest.is_empty() {
        return Ok(None);
    }

    for (source_id, value) in latest.iter() {
        let p = value.probability;
        if !p.is_finite() || !(0.0..=1.0).contains(&p) {
            return Err(ConsensusError::InvalidProbability {
                source_id,
                probability: p,
            });
        }
    }

    let probabilities = latest.probabilities();
    let weights = normalize_weights(&collect_weights(latest.source_ids(), configured_weights)?);

    let Aggregate {
        probability,
        disagreement,
        tier,
    } = aggregate(&probabilities, &weights);

    let ci = estimate_interval(&probabilities, &weights, settings, rng);

    Ok(Some(ConsensusEstimate {
        probability,
        disagreement,
        tier,
        ci_lower: ci.lower.min(probability),
        ci_upper: ci.upper.max(probability),
        source_count: latest.source_count(),
    }))
}
