//! REST API for the dashboard frontend
//!
//! All endpoints are `GET` and return JSON. See `filter_routes` and
//! `kpi_routes` for the individual routes.

pub mod error;
pub mod filter_routes;
pub mod kpi_routes;
pub mod state;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tracing::warn;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::ApiError;
pub use filter_routes::create_filter_router;
pub use kpi_routes::create_kpi_router;
pub use state::AppState;

/// GET /api/health
async fn health_check(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    for store in &state.stores {
        if let Err(e) = store.ping().await {
            warn!(store = store.label(), "Health check failed: {}", e);
            return Err(e.into());
        }
    }
    Ok(Json(json!({
        "status": "ok",
        "hierarchy": state.hierarchy.kind().to_string(),
    })))
}

/// Build the full router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .merge(create_filter_router())
        .merge(create_kpi_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}
