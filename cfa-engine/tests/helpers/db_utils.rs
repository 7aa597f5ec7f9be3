//! Database Test Utilities

use std::collections::BTreeMap;

use cfa_common::db::{init_database, NewEvent};
use cfa_engine::db::{events, sources};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Create a throwaway database with the full schema
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let pool = init_database(&temp_dir.path().join("test_cfa.db"))
        .await
        .expect("Failed to initialize test database");
    (temp_dir, pool)
}

/// Insert an active source and return its id
pub async fn add_source(pool: &SqlitePool, key: &str, weight: f64) -> i64 {
    let mut conn = pool.acquire().await.unwrap();
    sources::insert_source_if_missing(&mut *conn, key, &key.to_uppercase(), weight)
        .await
        .unwrap();
    sources::get_source_by_key(&mut *conn, key)
        .await
        .unwrap()
        .expect("source just inserted")
        .id
}

/// Insert an unresolved event tracked by the given (source id, external id) pairs
pub async fn add_event(pool: &SqlitePool, title: &str, external_ids: &[(i64, &str)]) -> i64 {
    let mut conn = pool.acquire().await.unwrap();
    let ids: BTreeMap<i64, String> = external_ids
        .iter()
        .map(|(source_id, external_id)| (*source_id, external_id.to_string()))
        .collect();

    events::insert_event(
        &mut *conn,
        &NewEvent {
            title: title.to_string(),
            description: None,
            category: "test".to_string(),
            resolution_date: None,
        },
        &ids,
    )
    .await
    .unwrap()
}

pub async fn observation_count(pool: &SqlitePool, event_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM forecasts WHERE event_id = ?")
        .bind(event_id)
        .fetch_one(pool)
        .await
        .unwrap()
}
