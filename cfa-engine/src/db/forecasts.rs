//! Forecast observation log (append-only)

use cfa_common::db::{ForecastObservation, NewObservation};
use cfa_common::time::to_db_timestamp;
use cfa_common::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::get_timestamp;

/// Observation joined with its source's display name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcedObservation {
    #[serde(flatten)]
    pub observation: ForecastObservation,
    pub source_name: String,
}

fn row_to_observation(row: &SqliteRow) -> Result<ForecastObservation> {
    Ok(ForecastObservation {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        source_id: row.try_get("source_id")?,
        probability: row.try_get("probability")?,
        observed_at: get_timestamp(row, "observed_at")?,
        raw_payload: row.try_get("raw_payload")?,
    })
}

/// Append one observation; returns its row id
pub async fn append_observation(conn: &mut SqliteConnection, obs: &NewObservation) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO forecasts (event_id, source_id, probability, observed_at, raw_payload)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(obs.event_id)
    .bind(obs.source_id)
    .bind(obs.probability)
    .bind(to_db_timestamp(&obs.observed_at))
    .bind(&obs.raw_payload)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Observations for an event in (observed_at, id) order
///
/// `since` is inclusive; `None` returns the full history.
pub async fn get_observations_for_event(
    conn: &mut SqliteConnection,
    event_id: i64,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<ForecastObservation>> {
    let since = since.map(|ts| to_db_timestamp(&ts));

    let rows = sqlx::query(
        r#"
        SELECT id, event_id, source_id, probability, observed_at, raw_payload
        FROM forecasts
        WHERE event_id = ? AND (? IS NULL OR observed_at >= ?)
        ORDER BY observed_at, id
        "#,
    )
    .bind(event_id)
    .bind(&since)
    .bind(&since)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_observation).collect()
}

/// Newest observation per source for an event, by (observed_at, id)
///
/// Returns at most one row per source, ordered by source id.
pub async fn get_latest_observations(
    conn: &mut SqliteConnection,
    event_id: i64,
) -> Result<Vec<ForecastObservation>> {
    let rows = sqlx::query(
        r#"
        SELECT id, event_id, source_id, probability, observed_at, raw_payload
        FROM (
            SELECT id, event_id, source_id, probability, observed_at, raw_payload,
                   ROW_NUMBER() OVER (
                       PARTITION BY source_id
                       ORDER BY observed_at DESC, id DESC
                   ) AS recency
            FROM forecasts
            WHERE event_id = ?
        )
        WHERE recency = 1
        ORDER BY source_id
        "#,
    )
    .bind(event_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_observation).collect()
}

/// Like [`get_observations_for_event`], with source display names
pub async fn get_sourced_observations(
    conn: &mut SqliteConnection,
    event_id: i64,
    since: DateTime<Utc>,
) -> Result<Vec<SourcedObservation>> {
    let rows = sqlx::query(
        r#"
        SELECT f.id, f.event_id, f.source_id, f.probability, f.observed_at, f.raw_payload,
               s.display_name AS source_name
        FROM forecasts f
        JOIN sources s ON s.id = f.source_id
        WHERE f.event_id = ? AND f.observed_at >= ?
        ORDER BY f.observed_at, f.id
        "#,
    )
    .bind(event_id)
    .bind(to_db_timestamp(&since))
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| -> Result<SourcedObservation> {
            Ok(SourcedObservation {
                observation: row_to_observation(row)?,
                source_name: row.try_get("source_name")?,
            })
        })
        .collect()
}
