//! Bootstrap data: default sources and events imported from TOML
//!
//! ```toml
//! [[events]]
//! title = "Will it rain in Paris on 1 May?"
//! category = "weather"
//! resolution_date = "2027-05-01T00:00:00Z"
//!
//! [events.external_ids]
//! polymarket = "will-it-rain-paris"
//! metaculus = "12345"
//! ```
//!
//! External ids are keyed by source key. Events are matched by title, so
//! importing the same file twice creates nothing new.

use std::collections::BTreeMap;
use std::path::Path;

use cfa_common::db::NewEvent;
use cfa_common::time::parse_db_timestamp;
use cfa_common::{Error, Result};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db::{events, sources};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub events: Vec<SeedEvent>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeedEvent {
    pub title: String,
    pub category: String,
    pub description: Option<String>,
    /// RFC 3339 string
    pub resolution_date: Option<String>,
    /// Source key → external id
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
}

/// Outcome of a seed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub sources_created: usize,
    pub events_created: usize,
    pub events_existing: usize,
}

pub fn parse_seed_file(contents: &str) -> Result<SeedFile> {
    toml::from_str(contents).map_err(|e| Error::Config(format!("Invalid events file: {}", e)))
}

pub fn load_seed_file(path: &Path) -> Result<SeedFile> {
    let contents = std::fs::read_to_string(path)?;
    parse_seed_file(&contents)
}

/// Seed default sources, then import events; all in one transaction
pub async fn seed(pool: &SqlitePool, file: Option<&SeedFile>) -> Result<SeedSummary> {
    let mut tx = pool.begin().await?;
    let mut summary = SeedSummary {
        sources_created: sources::seed_default_sources(&mut *tx).await?,
        ..Default::default()
    };

    for event in file.map(|f| f.events.as_slice()).unwrap_or_default() {
        if events::find_event_id_by_title(&mut *tx, &event.title).await?.is_some() {
            debug!(title = %event.title, "Event already present, skipping");
            summary.events_existing += 1;
            continue;
        }

        let mut external_ids = BTreeMap::new();
        for (key, external_id) in &event.external_ids {
            let source = sources::get_source_by_key(&mut *tx, key)
                .await?
                .ok_or_else(|| Error::InvalidInput(format!("Unknown source key '{}' for event '{}'", key, event.title)))?;
            external_ids.insert(source.id, external_id.clone());
        }

        let new_event = NewEvent {
            title: event.title.clone(),
            description: event.description.clone(),
            category: event.category.clone(),
            resolution_date: event
                .resolution_date
                .as_deref()
                .map(parse_db_timestamp)
                .transpose()?,
        };

        let event_id = events::insert_event(&mut *tx, &new_event, &external_ids).await?;
        debug!(event_id, title = %event.title, "Event imported");
        summary.events_created += 1;
    }

    tx.commit().await?;

    info!(
        sources_created = summary.sources_created,
        events_created = summary.events_created,
        events_existing = summary.events_existing,
        "Seed complete"
    );
    Ok(summary)
}
