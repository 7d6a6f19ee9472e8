//! Applies a [`MountDescriptor`] to the dispatch table.
//!
//! Every mount for one module happens under a single write guard:
//! routes this module mounted earlier but no longer declares are dropped,
//! then each target path is removed and re-inserted. A concurrent upload of
//! another script waits for the guard, so the table never shows a path
//! half-replaced and never accumulates duplicates. When two scripts target
//! the same path the later mount wins.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;

use super::endpoint::{derive_endpoint, normalize_prefix};
use super::table::{DispatchTable, MountKind, Provenance, RouteEntry};
use super::verb::Verb;
use crate::scripting::exports::MountDescriptor;
use crate::scripting::loader::ModuleIdentity;
use crate::scripting::path::ScriptPath;

/// What a mount changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountResult {
    /// Paths declared by the script's route bundle, in declaration order.
    Router { paths: Vec<String> },
    /// The derived endpoint the `handle` function now serves.
    Handler { endpoint: String },
    /// The script had nothing to mount; the table is untouched.
    NotMounted,
}

/// The only writer of the [`DispatchTable`].
#[derive(Debug, Clone)]
pub struct MountManager {
    table: Arc<DispatchTable>,
    prefix: String,
}

impl MountManager {
    /// `prefix` is normalized once here and applied to every derived
    /// endpoint.
    pub fn new(table: Arc<DispatchTable>, prefix: &str) -> Self {
        Self {
            table,
            prefix: normalize_prefix(prefix),
        }
    }

    /// Mount whatever `descriptor` offers on behalf of `identity`.
    pub async fn mount(
        &self,
        identity: &ModuleIdentity,
        filename: &ScriptPath,
        descriptor: MountDescriptor,
    ) -> MountResult {
        match descriptor {
            MountDescriptor::Router { bindings } => {
                let provenance = self.provenance(identity, filename, MountKind::Router);

                // Group by path, keeping first-declaration order.
                let mut order: Vec<String> = Vec::new();
                let mut entries: HashMap<String, RouteEntry> = HashMap::new();
                for binding in bindings {
                    let entry = entries.entry(binding.path.clone()).or_insert_with(|| {
                        order.push(binding.path.clone());
                        RouteEntry::new(provenance.clone())
                    });
                    entry.bind(&binding.verbs, binding.handler);
                }

                let keep: HashSet<&str> = order.iter().map(String::as_str).collect();
                {
                    let mut routes = self.table.write().await;
                    remove_stale(&mut routes, identity, &keep);
                    for path in &order {
                        if let Some(entry) = entries.remove(path) {
                            replace_entry(&mut routes, path, entry);
                        }
                    }
                }

                tracing::info!(module = %identity, paths = ?order, "Mounted script routes");
                MountResult::Router { paths: order }
            }
            MountDescriptor::Handler { handler } => {
                let endpoint = derive_endpoint(filename, &self.prefix);
                let mut entry =
                    RouteEntry::new(self.provenance(identity, filename, MountKind::Handler));
                entry.bind(&Verb::all(), handler);

                {
                    let mut routes = self.table.write().await;
                    remove_stale(&mut routes, identity, &HashSet::from([endpoint.as_str()]));
                    replace_entry(&mut routes, &endpoint, entry);
                }

                tracing::info!(module = %identity, endpoint = %endpoint, "Mounted script handler");
                MountResult::Handler { endpoint }
            }
            MountDescriptor::None => {
                tracing::debug!(module = %identity, "Script exports nothing mountable");
                MountResult::NotMounted
            }
        }
    }

    fn provenance(&self, identity: &ModuleIdentity, filename: &ScriptPath, kind: MountKind) -> Provenance {
        Provenance {
            identity: identity.clone(),
            filename: filename.to_string(),
            kind,
            mounted_at: Utc::now(),
        }
    }
}

/// Drop every path owned by `identity` that is not in `keep`.
fn remove_stale(
    routes: &mut HashMap<String, RouteEntry>,
    identity: &ModuleIdentity,
    keep: &HashSet<&str>,
) {
    routes.retain(|path, entry| {
        let stale = &entry.provenance().identity == identity && !keep.contains(path.as_str());
        if stale {
            tracing::info!(module = %identity, path = %path, "Unmounted stale route");
        }
        !stale
    });
}

/// Remove whatever is at `path`, then insert `entry`.
fn replace_entry(routes: &mut HashMap<String, RouteEntry>, path: &str, entry: RouteEntry) {
    if let Some(previous) = routes.remove(path) {
        let previous = previous.provenance();
        if previous.identity != entry.provenance().identity {
            tracing::warn!(
                path = %path,
                previous = %previous.identity,
                previous_file = %previous.filename,
                current = %entry.provenance().identity,
                "Route taken over by another script",
            );
        }
    }
    routes.insert(path.to_string(), entry);
}

/// Paths currently owned by each module, for diagnostics.
pub async fn ownership(table: &DispatchTable) -> BTreeMap<ModuleIdentity, Vec<String>> {
    let mut owned: BTreeMap<ModuleIdentity, Vec<String>> = BTreeMap::new();
    for summary in table.snapshot().await {
        owned
            .entry(summary.provenance.identity)
            .or_default()
            .push(summary.path);
    }
    owned
}
