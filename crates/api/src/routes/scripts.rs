//! Route definitions for script ingestion endpoints.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::scripts;
use crate::state::AppState;

/// Script routes, mounted at the root.
///
/// ```text
/// POST   /scripts                   -> upload_script
/// GET    /scripts/routes            -> list_routes
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/scripts", post(scripts::upload_script))
        .route("/scripts/routes", get(scripts::list_routes))
}
