//! The process-wide dispatch table.
//!
//! Maps a concrete path to the handlers bound on it, one per verb, plus a
//! record of which script put them there. Lookups take a read lock and
//! clone the handler `Arc` out, so a request never holds the lock while the
//! handler runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, RwLockWriteGuard};

use super::verb::{Verb, VerbSet};
use crate::scripting::handler::RouteHandler;
use crate::scripting::loader::ModuleIdentity;

/// How a route came to be mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    /// Declared by the script's route bundle.
    Router,
    /// The script's `handle` function at its filename-derived endpoint.
    Handler,
}

/// Which script owns a route, and since when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub identity: ModuleIdentity,
    pub filename: String,
    pub kind: MountKind,
    pub mounted_at: DateTime<Utc>,
}

/// Handlers bound on one path.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    handlers: BTreeMap<Verb, Arc<dyn RouteHandler>>,
    provenance: Provenance,
}

impl RouteEntry {
    pub fn new(provenance: Provenance) -> Self {
        Self {
            handlers: BTreeMap::new(),
            provenance,
        }
    }

    /// Bind `handler` for each verb in `verbs`, replacing earlier bindings
    /// of the same verb.
    pub fn bind(&mut self, verbs: &VerbSet, handler: Arc<dyn RouteHandler>) {
        for verb in verbs {
            self.handlers.insert(*verb, Arc::clone(&handler));
        }
    }

    pub fn verbs(&self) -> VerbSet {
        self.handlers.keys().copied().collect()
    }

    pub fn handler(&self, verb: Verb) -> Option<&Arc<dyn RouteHandler>> {
        self.handlers.get(&verb)
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

/// Read-only view of one mounted path, as listed by the API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    pub path: String,
    pub methods: VerbSet,
    #[serde(flatten)]
    pub provenance: Provenance,
}

/// Why a lookup did not produce a handler.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("No route mounted at {0}")]
    NotFound(String),

    #[error("Method {verb} not allowed on {path}")]
    MethodNotAllowed {
        path: String,
        verb: Verb,
        allowed: VerbSet,
    },
}

/// Path -> handlers, shared by every request task.
#[derive(Debug, Default)]
pub struct DispatchTable {
    routes: RwLock<HashMap<String, RouteEntry>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the handler for `verb` on `path`.
    pub async fn lookup(&self, path: &str, verb: Verb) -> Result<Arc<dyn RouteHandler>, LookupError> {
        let routes = self.routes.read().await;
        let entry = routes
            .get(path)
            .ok_or_else(|| LookupError::NotFound(path.to_string()))?;

        entry
            .handler(verb)
            .cloned()
            .ok_or_else(|| LookupError::MethodNotAllowed {
                path: path.to_string(),
                verb,
                allowed: entry.verbs(),
            })
    }

    /// Verbs bound on `path`, if anything is mounted there.
    pub async fn allowed_verbs(&self, path: &str) -> Option<VerbSet> {
        self.routes.read().await.get(path).map(RouteEntry::verbs)
    }

    /// Provenance of whatever is mounted at `path`.
    pub async fn provenance(&self, path: &str) -> Option<Provenance> {
        self.routes
            .read()
            .await
            .get(path)
            .map(|entry| entry.provenance().clone())
    }

    /// Every mounted path, sorted by path.
    pub async fn snapshot(&self) -> Vec<RouteSummary> {
        let routes = self.routes.read().await;
        let mut summaries: Vec<RouteSummary> = routes
            .iter()
            .map(|(path, entry)| RouteSummary {
                path: path.clone(),
                methods: entry.verbs(),
                provenance: entry.provenance().clone(),
            })
            .collect();
        summaries.sort_by(|a, b| a.path.cmp(&b.path));
        summaries
    }

    pub async fn len(&self) -> usize {
        self.routes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.routes.read().await.is_empty()
    }

    /// Exclusive access for a multi-step mutation.
    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, RouteEntry>> {
        self.routes.write().await
    }
}
