//! Database initialization
//!
//! Creates `cfa.db` on first run and brings the schema up idempotently.
//! Every `CREATE` uses `IF NOT EXISTS`, so calling [`init_database`] against
//! an existing database is safe.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// SQLite busy timeout applied to every connection (milliseconds)
pub const BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets API readers run alongside the ingestion writer
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_sources_table(pool).await?;
    create_events_table(pool).await?;
    create_event_external_ids_table(pool).await?;
    create_forecasts_table(pool).await?;
    create_consensus_table(pool).await?;

    info!("Database schema ready (sources, events, event_external_ids, forecasts, consensus)");
    Ok(())
}

async fn create_sources_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            weight REAL NOT NULL DEFAULT 1.0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT,
            category TEXT NOT NULL,
            resolution_date TEXT,
            resolved INTEGER NOT NULL DEFAULT 0,
            outcome TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_resolved ON events(resolved)")
        .execute(pool)
        .await?;

    Ok(())
}

/// One external identifier per (event, source); absence = source does not track the event
async fn create_event_external_ids_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS event_external_ids (
            event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
            external_id TEXT NOT NULL,
            PRIMARY KEY (event_id, source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Append-only observation log
async fn create_forecasts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS forecasts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            source_id INTEGER NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
            probability REAL NOT NULL,
            observed_at TEXT NOT NULL,
            raw_payload TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_forecasts_event_observed ON forecasts(event_id, observed_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One live snapshot per event
async fn create_consensus_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS consensus (
            event_id INTEGER PRIMARY KEY REFERENCES events(id) ON DELETE CASCADE,
            probability REAL NOT NULL,
            disagreement REAL NOT NULL,
            disagreement_label TEXT NOT NULL,
            confidence_interval_lower REAL NOT NULL,
            confidence_interval_upper REAL NOT NULL,
            source_count INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            previous_updated_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
