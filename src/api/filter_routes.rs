//! Filter dropdown endpoints
//!
//! - `GET /api/filters/years` - years available across KPI tables, newest first
//! - `GET /api/filters/:level` - `{id, name}` options for one hierarchy level

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};

use super::error::ApiError;
use super::state::AppState;
use crate::filters::GeoOption;
use crate::kpi::FilterSet;

/// GET /api/filters/years
async fn list_years(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.filters.list_years().await?))
}

/// GET /api/filters/:level
///
/// The root level takes no parameters. Every other level requires the
/// parent level's ID, e.g. `/api/filters/divisions?circleId=5`.
async fn list_level(
    State(state): State<AppState>,
    Path(level): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<GeoOption>>, ApiError> {
    let filters = FilterSet::from_params(params);
    Ok(Json(state.filters.list_level(&level, &filters).await?))
}

pub fn create_filter_router() -> Router<AppState> {
    Router::new()
        .route("/api/filters/years", get(list_years))
        .route("/api/filters/:level", get(list_level))
}
