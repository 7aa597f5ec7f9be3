//! cfa-engine library interface
//!
//! Exposes adapters, consensus math, storage operations, the ingestion
//! coordinator and the query API for the binary and integration tests.

pub mod adapters;
pub mod api;
pub mod config;
pub mod consensus;
pub mod db;
pub mod error;
pub mod ingestion;
pub mod seed;

pub use crate::error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::consensus::BootstrapSettings;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Used when a consensus is computed on the fly
    pub bootstrap: BootstrapSettings,
    pub bootstrap_seed: Option<u64>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Error from the most recent failed ingestion cycle
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(db: SqlitePool, bootstrap: BootstrapSettings, bootstrap_seed: Option<u64>) -> Self {
        Self {
            db,
            bootstrap,
            bootstrap_seed,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::event_routes())
        .merge(api::consensus_routes())
        .merge(api::source_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
