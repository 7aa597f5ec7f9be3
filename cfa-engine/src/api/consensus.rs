//! Consensus endpoint
//!
//! Serves the stored snapshot. Before the first cycle has produced one, the
//! consensus is computed from stored observations on the fly and returned
//! without being written.

use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use cfa_common::db::ConsensusSnapshot;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::consensus::{compute_consensus, select_latest};
use crate::db;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct ConsensusResponse {
    #[serde(flatten)]
    pub snapshot: ConsensusSnapshot,
    /// False when computed for this request and not persisted
    pub stored: bool,
}

/// GET /api/consensus/:id
pub async fn get_consensus(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> ApiResult<Json<ConsensusResponse>> {
    let mut conn = state.db.acquire().await?;

    if db::get_event(&mut *conn, event_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Event {} not found", event_id)));
    }

    if let Some(snapshot) = db::get_snapshot(&mut *conn, event_id).await? {
        return Ok(Json(ConsensusResponse {
            snapshot,
            stored: true,
        }));
    }

    let sources = db::get_active_sources(&mut *conn).await?;
    let active: HashSet<i64> = sources.iter().map(|s| s.id).collect();
    let weights: HashMap<i64, f64> = sources.iter().map(|s| (s.id, s.weight)).collect();

    let newest = db::get_latest_observations(&mut *conn, event_id).await?;
    let latest = select_latest(&newest, &active);

    let mut rng = match state.bootstrap_seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(event_id as u64)),
        None => StdRng::from_entropy(),
    };

    let estimate = compute_consensus(&latest, &weights, &state.bootstrap, &mut rng)
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("No forecasts available".to_string()))?;

    let now = cfa_common::time::now();
    Ok(Json(ConsensusResponse {
        snapshot: ConsensusSnapshot {
            event_id,
            probability: estimate.probability,
            disagreement: estimate.disagreement,
            disagreement_label: estimate.tier,
            confidence_interval_lower: estimate.ci_lower,
            confidence_interval_upper: estimate.ci_upper,
            source_count: estimate.source_count as i64,
            created_at: now,
            updated_at: now,
            previous_updated_at: None,
        },
        stored: false,
    }))
}

pub fn consensus_routes() -> Router<AppState> {
    Router::new().route("/api/consensus/:id", get(get_consensus))
}
