//! KPI endpoints
//!
//! - `GET /api/kpi` - the metric catalog
//! - `GET /api/kpi/:metric` - one metric for a filter set, e.g.
//!   `/api/kpi/billing-efficiency?sectionId=42&year=2023`

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};

use super::error::ApiError;
use super::state::AppState;
use crate::error::QueryError;
use crate::kpi::{FilterSet, KpiRows, KpiSummary};

/// GET /api/kpi
async fn list_metrics(State(state): State<AppState>) -> Json<Vec<KpiSummary>> {
    Json(state.catalog.summaries())
}

/// GET /api/kpi/:metric
///
/// `year` is always required; the geographic parameters accepted are those
/// of the configured hierarchy (`circleId`, `divisionId`, `subdivisionId`,
/// `sectionId` by default).
async fn get_metric(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<KpiRows>, ApiError> {
    let metric = state
        .catalog
        .get(&slug)
        .ok_or_else(|| QueryError::UnknownMetric {
            what: "KPI metric",
            name: slug.clone(),
        })?;

    let filters = FilterSet::from_params(params);
    Ok(Json(state.kpi.build_and_run(metric, &filters).await?))
}

pub fn create_kpi_router() -> Router<AppState> {
    Router::new()
        .route("/api/kpi", get(list_metrics))
        .route("/api/kpi/:metric", get(get_metric))
}
