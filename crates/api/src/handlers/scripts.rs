//! Handlers for script ingestion and the mounted-route listing.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use scaffold_core::routing::table::RouteSummary;
use scaffold_core::scripting::upload::ScriptUpload;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::scripting::orchestrator::IngestReport;
use crate::state::AppState;

/// POST /scripts
///
/// Save the script, load it, and mount whatever it exports. A body that
/// does not deserialize into [`ScriptUpload`] is rejected by the `Json`
/// extractor before this runs.
pub async fn upload_script(
    State(state): State<AppState>,
    Json(input): Json<ScriptUpload>,
) -> AppResult<(StatusCode, Json<IngestReport>)> {
    let report = state.orchestrator.ingest(input).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /scripts/routes
///
/// List every path currently served from uploaded scripts.
pub async fn list_routes(
    State(state): State<AppState>,
) -> Json<DataResponse<Vec<RouteSummary>>> {
    Json(DataResponse {
        data: state.dispatch.snapshot().await,
    })
}
