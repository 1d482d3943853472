//! Ingest statistics endpoint.

use axum::extract::State;
use axum::{routing::get, Json, Router};

use crate::state::AppState;
use crate::stats::StatsSnapshot;

/// Creates the stats routes.
pub fn stats_routes() -> Router<AppState> {
    Router::new().route("/stats", get(get_stats))
}

async fn get_stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.stats().snapshot())
}
