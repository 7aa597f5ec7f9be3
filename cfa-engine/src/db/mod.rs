//! Storage operations for cfa-engine
//!
//! Every function takes an explicit `&mut SqliteConnection`, so the same
//! call works on a pooled connection or inside an open transaction
//! (`&mut *tx`). Schema creation lives in `cfa_common::db`.

pub mod consensus;
pub mod events;
pub mod forecasts;
pub mod sources;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use cfa_common::time::{parse_db_timestamp, parse_optional_db_timestamp};
use cfa_common::Result;
use chrono::{DateTime, Utc};

pub use consensus::{get_snapshot, upsert_snapshot, upsert_snapshot_at, SnapshotUpdate};
pub use events::{
    get_event, get_unresolved_events, insert_event, list_events, resolve_event, EventFilter,
};
pub use forecasts::{
    append_observation, get_latest_observations, get_observations_for_event,
    get_sourced_observations,
};
pub use sources::{get_active_sources, get_source, list_sources, seed_default_sources};

fn get_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let value: String = row.try_get(column)?;
    parse_db_timestamp(&value)
}

fn get_optional_timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let value: Option<String> = row.try_get(column)?;
    parse_optional_db_timestamp(value.as_deref())
}
