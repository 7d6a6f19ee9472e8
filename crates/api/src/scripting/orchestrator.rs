//! Central script ingestion service.
//!
//! Coordinates validation, storage, loading, export inspection and mounting
//! for one upload. Held in [`AppState`](crate::state::AppState) as an
//! `Arc<ScriptOrchestrator>`.

use std::sync::Arc;

use serde::Serialize;
use scaffold_core::error::CoreError;
use scaffold_core::routing::mount::{MountManager, MountResult};
use scaffold_core::routing::table::{DispatchTable, MountKind};
use scaffold_core::scripting::exports::inspect;
use scaffold_core::scripting::loader::ModuleLoader;
use scaffold_core::scripting::path::validate_filename;
use scaffold_core::scripting::store::ScriptStore;
use scaffold_core::scripting::upload::ScriptUpload;

use crate::config::ServerConfig;
use crate::error::AppResult;

/// `mountedAt` value for route bundles, whose paths come from the script.
pub const AS_DEFINED_IN_SCRIPT: &str = "as-defined-in-script";

const ROUTER_NOTE: &str =
    "Detected a `routes()` bundle and mounted its paths as declared, with no additional prefix.";

const HANDLER_NOTE: &str = "Detected a `handle` function and mounted it at a derived endpoint. \
     Set HANDLER_PREFIX env var to change the base path.";

const UNMOUNTED_NOTE: &str = "Script saved. To auto-mount, define either:\n  \
     1) `fn routes()` returning route entries (your script defines its own routes), or\n  \
     2) `fn handle(request)` (mounted at a filename-derived endpoint).";

/// Outcome of a successful upload, returned to the client as-is.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub status: &'static str,
    pub written_to: String,
    pub mounted: Option<MountKind>,
    pub mounted_at: Option<String>,
    /// Paths now served on behalf of this script.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<String>,
    pub note: &'static str,
}

impl IngestReport {
    fn new(written_to: String, result: MountResult) -> Self {
        let (mounted, mounted_at, routes, note) = match result {
            MountResult::Router { paths } => (
                Some(MountKind::Router),
                Some(AS_DEFINED_IN_SCRIPT.to_string()),
                paths,
                ROUTER_NOTE,
            ),
            MountResult::Handler { endpoint } => (
                Some(MountKind::Handler),
                Some(endpoint.clone()),
                vec![endpoint],
                HANDLER_NOTE,
            ),
            MountResult::NotMounted => (None, None, Vec::new(), UNMOUNTED_NOTE),
        };

        Self {
            status: "created",
            written_to,
            mounted,
            mounted_at,
            routes,
            note,
        }
    }
}

/// Runs the upload pipeline:
///
/// 1. Check the request shape and validate the filename.
/// 2. Write the source under the base directory.
/// 3. Load it as a module (the file stays on disk if this fails).
/// 4. Inspect its exports.
/// 5. Mount them into the dispatch table.
#[derive(Debug)]
pub struct ScriptOrchestrator {
    store: ScriptStore,
    loader: ModuleLoader,
    mounts: MountManager,
}

impl ScriptOrchestrator {
    pub fn new(store: ScriptStore, loader: ModuleLoader, mounts: MountManager) -> Self {
        Self {
            store,
            loader,
            mounts,
        }
    }

    /// Open the script base directory and wire the pipeline to `table`.
    pub async fn from_config(config: &ServerConfig, table: Arc<DispatchTable>) -> AppResult<Self> {
        let store = ScriptStore::open(&config.scripts_base).await?;
        tracing::info!(base = %store.base().display(), "Script store ready");

        Ok(Self::new(
            store,
            ModuleLoader::new(config.script_limits()),
            MountManager::new(table, &config.handler_prefix),
        ))
    }

    /// Ingest one uploaded script.
    pub async fn ingest(&self, upload: ScriptUpload) -> AppResult<IngestReport> {
        upload.check_shape()?;
        let relative = validate_filename(&upload.filename)?;

        let stored = self.store.persist(&relative, &upload.source).await?;

        let module = self.loader.load(&stored).await.map_err(|failure| {
            tracing::warn!(
                filename = %relative,
                error = %failure,
                "Uploaded script failed to load",
            );
            CoreError::Load(failure)
        })?;

        let descriptor = inspect(&module).await;
        let result = self
            .mounts
            .mount(module.identity(), module.filename(), descriptor)
            .await;

        Ok(IngestReport::new(
            stored.absolute_path.display().to_string(),
            result,
        ))
    }
}
