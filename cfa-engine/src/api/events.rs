//! Event and observation endpoints

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use cfa_common::db::Event;
use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::db::{self, forecasts::SourcedObservation, EventFilter};
use crate::{ApiError, ApiResult, AppState};

/// Default look-back window for `/forecasts`
pub const DEFAULT_FORECAST_HOURS: u32 = 24;

#[derive(Debug, Default, Deserialize)]
pub struct EventListQuery {
    pub category: Option<String>,
    pub resolved: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastWindowQuery {
    #[serde(default = "default_hours")]
    pub hours: u32,
}

fn default_hours() -> u32 {
    DEFAULT_FORECAST_HOURS
}

/// GET /api/events
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventListQuery>,
) -> ApiResult<Json<Vec<Event>>> {
    let filter = EventFilter {
        category: query.category,
        resolved: query.resolved,
    };

    let mut conn = state.db.acquire().await?;
    let events = db::list_events(&mut *conn, &filter).await?;
    Ok(Json(events))
}

/// GET /api/events/:id
pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> ApiResult<Json<Event>> {
    let mut conn = state.db.acquire().await?;
    db::get_event(&mut *conn, event_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Event {} not found", event_id)))
}

/// GET /api/events/:id/forecasts?hours=N
///
/// Observations within the last N hours, oldest first.
pub async fn get_event_forecasts(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Query(window): Query<ForecastWindowQuery>,
) -> ApiResult<Json<Vec<SourcedObservation>>> {
    if window.hours == 0 {
        return Err(ApiError::BadRequest("hours must be at least 1".to_string()));
    }

    let mut conn = state.db.acquire().await?;
    if db::get_event(&mut *conn, event_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Event {} not found", event_id)));
    }

    let since = Utc::now() - Duration::hours(i64::from(window.hours));
    let observations = db::get_sourced_observations(&mut *conn, event_id, since).await?;
    Ok(Json(observations))
}

pub fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/api/events", get(list_events))
        .route("/api/events/:id", get(get_event))
        .route("/api/events/:id/forecasts", get(get_event_forecasts))
}
