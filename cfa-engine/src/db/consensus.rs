//! Consensus snapshot upserter
//!
//! One live row per event. An overwrite replaces every computed field,
//! carries the old `updated_at` into `previous_updated_at`, and stamps a
//! new `updated_at` that is strictly later than the old one.

use cfa_common::db::{ConsensusSnapshot, DisagreementTier};
use cfa_common::time::{now, parse_optional_db_timestamp, strictly_after, to_db_timestamp};
use cfa_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::{get_optional_timestamp, get_timestamp};
use crate::consensus::ConsensusEstimate;

/// Computed fields written by an upsert
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotUpdate {
    pub probability: f64,
    pub disagreement: f64,
    pub tier: DisagreementTier,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub source_count: i64,
}

impl From<&ConsensusEstimate> for SnapshotUpdate {
    fn from(estimate: &ConsensusEstimate) -> Self {
        Self {
            probability: estimate.probability,
            disagreement: estimate.disagreement,
            tier: estimate.tier,
            ci_lower: estimate.ci_lower,
            ci_upper: estimate.ci_upper,
            source_count: estimate.source_count as i64,
        }
    }
}

fn row_to_snapshot(row: &SqliteRow) -> Result<ConsensusSnapshot> {
    let label: String = row.try_get("disagreement_label")?;

    Ok(ConsensusSnapshot {
        event_id: row.try_get("event_id")?,
        probability: row.try_get("probability")?,
        disagreement: row.try_get("disagreement")?,
        disagreement_label: label.parse()?,
        confidence_interval_lower: row.try_get("confidence_interval_lower")?,
        confidence_interval_upper: row.try_get("confidence_interval_upper")?,
        source_count: row.try_get("source_count")?,
        created_at: get_timestamp(row, "created_at")?,
        updated_at: get_timestamp(row, "updated_at")?,
        previous_updated_at: get_optional_timestamp(row, "previous_updated_at")?,
    })
}

pub async fn get_snapshot(
    conn: &mut SqliteConnection,
    event_id: i64,
) -> Result<Option<ConsensusSnapshot>> {
    let row = sqlx::query(
        r#"
        SELECT event_id, probability, disagreement, disagreement_label,
               confidence_interval_lower, confidence_interval_upper, source_count,
               created_at, updated_at, previous_updated_at
        FROM consensus
        WHERE event_id = ?
        "#,
    )
    .bind(event_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_snapshot).transpose()
}

/// Create or overwrite the event's snapshot, stamped with the current time
pub async fn upsert_snapshot(
    conn: &mut SqliteConnection,
    event_id: i64,
    update: &SnapshotUpdate,
) -> Result<ConsensusSnapshot> {
    upsert_snapshot_at(conn, event_id, update, now()).await
}

/// [`upsert_snapshot`] with an explicit clock reading
///
/// When `at` is not after the stored `updated_at` (clock did not advance),
/// the new stamp is the stored one plus one microsecond.
pub async fn upsert_snapshot_at(
    conn: &mut SqliteConnection,
    event_id: i64,
    update: &SnapshotUpdate,
    at: DateTime<Utc>,
) -> Result<ConsensusSnapshot> {
    let previous: Option<String> =
        sqlx::query_scalar("SELECT updated_at FROM consensus WHERE event_id = ?")
            .bind(event_id)
            .fetch_optional(&mut *conn)
            .await?;
    let previous = parse_optional_db_timestamp(previous.as_deref())?;

    let stamp = to_db_timestamp(&strictly_after(previous, at));

    sqlx::query(
        r#"
        INSERT INTO consensus (
            event_id, probability, disagreement, disagreement_label,
            confidence_interval_lower, confidence_interval_upper, source_count,
            created_at, updated_at, previous_updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)
        ON CONFLICT(event_id) DO UPDATE SET
            probability = excluded.probability,
            disagreement = excluded.disagreement,
            disagreement_label = excluded.disagreement_label,
            confidence_interval_lower = excluded.confidence_interval_lower,
            confidence_interval_upper = excluded.confidence_interval_upper,
            source_count = excluded.source_count,
            previous_updated_at = consensus.updated_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(event_id)
    .bind(update.probability)
    .bind(update.disagreement)
    .bind(update.tier.as_str())
    .bind(update.ci_lower)
    .bind(update.ci_upper)
    .bind(update.source_count)
    .bind(&stamp)
    .bind(&stamp)
    .execute(&mut *conn)
    .await?;

    get_snapshot(conn, event_id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Snapshot for event {} missing after upsert", event_id)))
}
