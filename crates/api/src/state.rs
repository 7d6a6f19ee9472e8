use std::sync::Arc;

use scaffold_core::routing::table::DispatchTable;

use crate::config::ServerConfig;
use crate::error::AppResult;
use crate::scripting::orchestrator::ScriptOrchestrator;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Upload pipeline; the only writer of `dispatch`.
    pub orchestrator: Arc<ScriptOrchestrator>,
    /// Live routes mounted from uploaded scripts.
    pub dispatch: Arc<DispatchTable>,
}

impl AppState {
    /// Build state with an empty dispatch table.
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        let dispatch = Arc::new(DispatchTable::new());
        let orchestrator =
            ScriptOrchestrator::from_config(&config, Arc::clone(&dispatch)).await?;

        Ok(Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            dispatch,
        })
    }
}
