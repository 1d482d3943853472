//! Health check endpoint.
//!
//! Mirrors the gRPC health status for load balancers that only speak HTTP.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::health::ServingState;
use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `serving` or `not_serving`.
    pub status: &'static str,
    /// Service name reported to gRPC health checks.
    pub service: String,
    /// Server version.
    pub version: &'static str,
}

/// Creates the health check routes.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
///
/// Returns 200 while serving and 503 otherwise.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let status = state.probe().current_status();
    let code = match status {
        ServingState::Serving => StatusCode::OK,
        ServingState::NotServing => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        code,
        Json(HealthResponse {
            status: status.as_str(),
            service: state.probe().service_name().to_string(),
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}
