//! Source registry

use cfa_common::db::Source;
use cfa_common::time::{now, to_db_timestamp};
use cfa_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::info;

use super::get_timestamp;

/// Built-in providers: (key, display name)
pub const DEFAULT_SOURCES: [(&str, &str); 4] = [
    ("polymarket", "Polymarket"),
    ("kalshi", "Kalshi"),
    ("metaculus", "Metaculus"),
    ("public_model", "Public Model"),
];

const SOURCE_COLUMNS: &str = "id, key, display_name, weight, is_active, created_at";

fn row_to_source(row: &SqliteRow) -> Result<Source> {
    Ok(Source {
        id: row.try_get("id")?,
        key: row.try_get("key")?,
        display_name: row.try_get("display_name")?,
        weight: row.try_get("weight")?,
        is_active: row.try_get("is_active")?,
        created_at: get_timestamp(row, "created_at")?,
    })
}

/// Sources participating in ingestion and consensus
pub async fn get_active_sources(conn: &mut SqliteConnection) -> Result<Vec<Source>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM sources WHERE is_active = 1 ORDER BY id",
        SOURCE_COLUMNS
    ))
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_source).collect()
}

pub async fn list_sources(conn: &mut SqliteConnection) -> Result<Vec<Source>> {
    let rows = sqlx::query(&format!("SELECT {} FROM sources ORDER BY id", SOURCE_COLUMNS))
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(row_to_source).collect()
}

pub async fn get_source(conn: &mut SqliteConnection, id: i64) -> Result<Option<Source>> {
    let row = sqlx::query(&format!("SELECT {} FROM sources WHERE id = ?", SOURCE_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_source).transpose()
}

pub async fn get_source_by_key(conn: &mut SqliteConnection, key: &str) -> Result<Option<Source>> {
    let row = sqlx::query(&format!("SELECT {} FROM sources WHERE key = ?", SOURCE_COLUMNS))
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_source).transpose()
}

/// Insert a source unless its key already exists
///
/// Returns true when a row was created. Existing rows keep their weight and
/// active flag.
pub async fn insert_source_if_missing(
    conn: &mut SqliteConnection,
    key: &str,
    display_name: &str,
    weight: f64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO sources (key, display_name, weight, is_active, created_at)
        VALUES (?, ?, ?, 1, ?)
        ON CONFLICT(key) DO NOTHING
        "#,
    )
    .bind(key)
    .bind(display_name)
    .bind(weight)
    .bind(to_db_timestamp(&now()))
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Create the built-in sources (weight 1.0, active); idempotent
pub async fn seed_default_sources(conn: &mut SqliteConnection) -> Result<usize> {
    let mut created = 0;
    for (key, display_name) in DEFAULT_SOURCES {
        if insert_source_if_missing(conn, key, display_name, 1.0).await? {
            created += 1;
        }
    }

    info!(created, "Default sources seeded");
    Ok(created)
}

/// Change weight and active flag for one source
pub async fn update_source(
    conn: &mut SqliteConnection,
    id: i64,
    weight: f64,
    is_active: bool,
) -> Result<()> {
    sqlx::query("UPDATE sources SET weight = ?, is_active = ? WHERE id = ?")
        .bind(weight)
        .bind(is_active)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}
