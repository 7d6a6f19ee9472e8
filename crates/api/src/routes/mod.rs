pub mod health;
pub mod scripts;

use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the route tree.
///
/// Route hierarchy:
///
/// ```text
/// /health                    service status (GET)
/// /healthz                   liveness (GET)
///
/// /scripts                   upload a script (POST)
/// /scripts/routes            list mounted routes (GET)
///
/// *                          dispatch table (routes mounted from scripts)
/// ```
///
/// Static routes always win over mounted ones: a script that declares
/// `/health` is stored and recorded in the table but never reached.
pub fn app_routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(scripts::router())
        .fallback(handlers::dispatch::dispatch)
}
