use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Number of paths currently mounted from uploaded scripts.
    pub mounted_routes: usize,
}

/// Liveness payload kept for existing probes.
#[derive(Serialize)]
pub struct LivenessResponse {
    pub ok: bool,
}

/// GET /health -- returns service status and mounted route count.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        mounted_routes: state.dispatch.len().await,
    })
}

/// GET /healthz -- `{ "ok": true }` whenever the process is serving.
async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { ok: true })
}

/// Mount health check routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
}
