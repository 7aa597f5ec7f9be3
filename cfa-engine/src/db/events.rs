//! Events and their per-source external identifiers

use std::collections::{BTreeMap, HashMap};

use cfa_common::db::{Event, NewEvent};
use cfa_common::time::{now, to_db_timestamp};
use cfa_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use super::{get_optional_timestamp, get_timestamp};

const EVENT_COLUMNS: &str =
    "id, title, description, category, resolution_date, resolved, outcome, created_at, updated_at";

/// Optional filters for [`list_events`]
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub category: Option<String>,
    pub resolved: Option<bool>,
}

fn row_to_event(row: &SqliteRow) -> Result<Event> {
    Ok(Event {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        resolution_date: get_optional_timestamp(row, "resolution_date")?,
        resolved: row.try_get("resolved")?,
        outcome: row.try_get("outcome")?,
        created_at: get_timestamp(row, "created_at")?,
        updated_at: get_optional_timestamp(row, "updated_at")?,
        external_ids: BTreeMap::new(),
    })
}

async fn external_ids_for(
    conn: &mut SqliteConnection,
    event_id: i64,
) -> Result<BTreeMap<i64, String>> {
    let rows = sqlx::query(
        "SELECT source_id, external_id FROM event_external_ids WHERE event_id = ?",
    )
    .bind(event_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| -> Result<(i64, String)> {
            Ok((row.try_get("source_id")?, row.try_get("external_id")?))
        })
        .collect()
}

/// Unresolved events with their external ids, oldest first
pub async fn get_unresolved_events(conn: &mut SqliteConnection) -> Result<Vec<Event>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM events WHERE resolved = 0 ORDER BY id",
        EVENT_COLUMNS
    ))
    .fetch_all(&mut *conn)
    .await?;

    let mut events: Vec<Event> = rows.iter().map(row_to_event).collect::<Result<_>>()?;

    let id_rows = sqlx::query(
        r#"
        SELECT x.event_id, x.source_id, x.external_id
        FROM event_external_ids x
        JOIN events e ON e.id = x.event_id
        WHERE e.resolved = 0
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut by_event: HashMap<i64, BTreeMap<i64, String>> = HashMap::new();
    for row in &id_rows {
        let event_id: i64 = row.try_get("event_id")?;
        by_event
            .entry(event_id)
            .or_default()
            .insert(row.try_get("source_id")?, row.try_get("external_id")?);
    }

    for event in &mut events {
        if let Some(ids) = by_event.remove(&event.id) {
            event.external_ids = ids;
        }
    }

    Ok(events)
}

/// Events newest first, optionally filtered
pub async fn list_events(conn: &mut SqliteConnection, filter: &EventFilter) -> Result<Vec<Event>> {
    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM events WHERE 1 = 1", EVENT_COLUMNS));

    if let Some(category) = &filter.category {
        query.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(resolved) = filter.resolved {
        query.push(" AND resolved = ").push_bind(resolved);
    }
    query.push(" ORDER BY created_at DESC, id DESC");

    let rows = query.build().fetch_all(&mut *conn).await?;
    rows.iter().map(row_to_event).collect()
}

pub async fn get_event(conn: &mut SqliteConnection, id: i64) -> Result<Option<Event>> {
    let row = sqlx::query(&format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut event = row_to_event(&row)?;
    event.external_ids = external_ids_for(conn, id).await?;
    Ok(Some(event))
}

pub async fn find_event_id_by_title(conn: &mut SqliteConnection, title: &str) -> Result<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM events WHERE title = ? ORDER BY id LIMIT 1")
        .bind(title)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

/// Insert an event and its external ids; returns the new id
pub async fn insert_event(
    conn: &mut SqliteConnection,
    event: &NewEvent,
    external_ids: &BTreeMap<i64, String>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO events (title, description, category, resolution_date, resolved, created_at)
        VALUES (?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(&event.title)
    .bind(&event.description)
    .bind(&event.category)
    .bind(event.resolution_date.as_ref().map(to_db_timestamp))
    .bind(to_db_timestamp(&now()))
    .execute(&mut *conn)
    .await?;

    let event_id = result.last_insert_rowid();
    for (source_id, external_id) in external_ids {
        set_external_id(conn, event_id, *source_id, external_id).await?;
    }

    Ok(event_id)
}

/// Attach or replace the external id a source uses for an event
pub async fn set_external_id(
    conn: &mut SqliteConnection,
    event_id: i64,
    source_id: i64,
    external_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO event_external_ids (event_id, source_id, external_id)
        VALUES (?, ?, ?)
        ON CONFLICT(event_id, source_id) DO UPDATE SET
            external_id = excluded.external_id
        "#,
    )
    .bind(event_id)
    .bind(source_id)
    .bind(external_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Flip an event to resolved with its outcome
///
/// Resolution happens once: resolving an already-resolved event is an
/// `InvalidInput` error, a missing event is `NotFound`.
pub async fn resolve_event(conn: &mut SqliteConnection, id: i64, outcome: &str) -> Result<()> {
    let result = sqlx::query(
        "UPDATE events SET resolved = 1, outcome = ?, updated_at = ? WHERE id = ? AND resolved = 0",
    )
    .bind(outcome)
    .bind(to_db_timestamp(&now()))
    .bind(id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    match get_event(conn, id).await? {
        Some(_) => Err(Error::InvalidInput(format!("Event {} is already resolved", id))),
        None => Err(Error::NotFound(format!("Event {}", id))),
    }
}
