//! Source endpoints

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use cfa_common::db::Source;

use crate::db;
use crate::{ApiError, ApiResult, AppState};

/// GET /api/sources
pub async fn list_sources(State(state): State<AppState>) -> ApiResult<Json<Vec<Source>>> {
    let mut conn = state.db.acquire().await?;
    Ok(Json(db::list_sources(&mut *conn).await?))
}

/// GET /api/sources/:id
pub async fn get_source(
    State(state): State<AppState>,
    Path(source_id): Path<i64>,
) -> ApiResult<Json<Source>> {
    let mut conn = state.db.acquire().await?;
    db::get_source(&mut *conn, source_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Source {} not found", source_id)))
}

pub fn source_routes() -> Router<AppState> {
    Router::new()
        .route("/api/sources", get(list_sources))
        .route("/api/sources/:id", get(get_source))
}
