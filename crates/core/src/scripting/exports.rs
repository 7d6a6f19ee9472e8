//! Decides what a loaded module offers for mounting.
//!
//! Two export conventions are recognised, checked in order:
//!
//! 1. A zero-argument `routes()` function returning a route bundle, an
//!    array of maps like
//!    `#{ path: "/items", methods: ["GET", "POST"], handler: "list_items" }`.
//!    `methods` may be a single string and defaults to every verb;
//!    `handler` may be a function name or a plain function pointer
//!    (`Fn("list_items")`).
//! 2. A `handle` function taking the request map (or nothing).
//!
//! A bundle that cannot be interpreted is logged and skipped, so a script
//! that also defines `handle` still gets mounted.

use std::collections::BTreeSet;
use std::sync::Arc;

use rhai::{Array, Dynamic, FnPtr, Map};

use super::handler::{invoke, RouteHandler, ScriptFunction};
use super::loader::LoadedModule;
use crate::routing::verb::{Verb, VerbSet};

/// Function returning a route bundle.
pub const ROUTER_EXPORT: &str = "routes";

/// Function mounted at the filename-derived endpoint.
pub const HANDLER_EXPORT: &str = "handle";

/// One route declared by a bundle.
#[derive(Debug, Clone)]
pub struct RouteBinding {
    pub path: String,
    pub verbs: VerbSet,
    pub handler: Arc<dyn RouteHandler>,
}

/// The mountable export of a module.
#[derive(Debug, Clone)]
pub enum MountDescriptor {
    /// Routes at script-defined paths.
    Router { bindings: Vec<RouteBinding> },
    /// A single handler for the derived endpoint.
    Handler { handler: Arc<dyn RouteHandler> },
    /// Nothing recognised; the script is stored but not routed.
    None,
}

impl MountDescriptor {
    pub fn is_none(&self) -> bool {
        matches!(self, MountDescriptor::None)
    }
}

/// Inspect `module` for a router bundle, then a handler.
pub async fn inspect(module: &Arc<LoadedModule>) -> MountDescriptor {
    if module.has_function(ROUTER_EXPORT, 0) {
        match router_bindings(module).await {
            Ok(bindings) => return MountDescriptor::Router { bindings },
            Err(reason) => tracing::warn!(
                module = %module.identity(),
                reason = %reason,
                "Ignoring unusable route bundle",
            ),
        }
    }

    if let Some(arity) = module.handler_arity(HANDLER_EXPORT) {
        return MountDescriptor::Handler {
            handler: Arc::new(ScriptFunction::new(Arc::clone(module), HANDLER_EXPORT, arity)),
        };
    }

    MountDescriptor::None
}

async fn router_bindings(module: &Arc<LoadedModule>) -> Result<Vec<RouteBinding>, String> {
    let bundle = invoke(Arc::clone(module), ROUTER_EXPORT.to_string(), Vec::new())
        .await
        .map_err(|e| format!("`{ROUTER_EXPORT}()` failed: {e}"))?;

    let entries = bundle
        .try_cast::<Array>()
        .ok_or_else(|| format!("`{ROUTER_EXPORT}()` must return an array"))?;
    if entries.is_empty() {
        return Err(format!("`{ROUTER_EXPORT}()` returned no routes"));
    }

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            parse_binding(module, entry).map_err(|reason| format!("route #{index}: {reason}"))
        })
        .collect()
}

fn parse_binding(module: &Arc<LoadedModule>, entry: Dynamic) -> Result<RouteBinding, String> {
    let map = entry
        .try_cast::<Map>()
        .ok_or("entry must be an object map")?;

    let path = map
        .get("path")
        .and_then(|p| p.clone().into_string().ok())
        .ok_or("`path` must be a string")?;
    if !path.starts_with('/') {
        return Err(format!("`path` must start with '/', got '{path}'"));
    }

    let verbs = match map.get("methods") {
        None => Verb::all(),
        Some(methods) => parse_verbs(methods)?,
    };

    let name = map
        .get("handler")
        .ok_or_else(|| "`handler` is required".to_string())
        .and_then(handler_name)?;
    let arity = module
        .handler_arity(&name)
        .ok_or_else(|| format!("no function '{name}' taking 0 or 1 arguments"))?;

    Ok(RouteBinding {
        path,
        verbs,
        handler: Arc::new(ScriptFunction::new(Arc::clone(module), name, arity)),
    })
}

fn parse_verbs(methods: &Dynamic) -> Result<VerbSet, String> {
    let names: Vec<String> = if let Ok(single) = methods.clone().into_string() {
        vec![single]
    } else if let Some(list) = methods.clone().try_cast::<Array>() {
        list.into_iter()
            .map(|m| m.into_string().map_err(|_| "`methods` entries must be strings".to_string()))
            .collect::<Result<_, _>>()?
    } else {
        return Err("`methods` must be a string or an array of strings".into());
    };

    let verbs = names
        .iter()
        .map(|name| name.parse::<Verb>())
        .collect::<Result<BTreeSet<_>, _>>()?;
    if verbs.is_empty() {
        return Err("`methods` must not be empty".into());
    }
    Ok(verbs)
}

fn handler_name(handler: &Dynamic) -> Result<String, String> {
    if let Ok(name) = handler.clone().into_string() {
        return Ok(name);
    }
    match handler.clone().try_cast::<FnPtr>() {
        Some(ptr) if ptr.is_anonymous() => Err("closures cannot be mounted as handlers".into()),
        Some(ptr) if ptr.is_curried() => Err("curried function pointers cannot be mounted".into()),
        Some(ptr) => Ok(ptr.fn_name().to_string()),
        None => Err("`handler` must be a function name or function pointer".into()),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::scripting::handler::ScriptRequest;
    use crate::scripting::test_helpers::load_source;

    async fn descriptor(source: &str) -> MountDescriptor {
        let (_dir, module) = load_source("tools/sample.rhai", source).await;
        inspect(&module).await
    }

    #[tokio::test]
    async fn handle_function_is_a_handler() {
        let d = descriptor("fn handle(request) { #{ ok: true } }").await;
        assert_matches!(d, MountDescriptor::Handler { .. });
    }

    #[tokio::test]
    async fn zero_argument_handle_is_accepted() {
        let d = descriptor("fn handle() { 1 }").await;
        assert_matches!(d, MountDescriptor::Handler { .. });
    }

    #[tokio::test]
    async fn handle_with_wrong_arity_is_ignored() {
        let d = descriptor("fn handle(a, b) { a + b }").await;
        assert!(d.is_none());
    }

    #[tokio::test]
    async fn module_without_exports_is_none() {
        let d = descriptor("let x = 1; fn helper() { x }").await;
        assert!(d.is_none());
    }

    #[tokio::test]
    async fn router_bundle_takes_precedence_over_handle() {
        let source = r#"
            fn list(request) { [1, 2, 3] }
            fn create(request) { #{ status: 201, body: request.body } }
            fn handle() { "fallback" }
            fn routes() {
                [
                    #{ path: "/items", methods: "get", handler: "list" },
                    #{ path: "/items", methods: ["POST"], handler: Fn("create") },
                ]
            }
        "#;
        let bindings = match descriptor(source).await {
            MountDescriptor::Router { bindings } => bindings,
            other => panic!("expected router, got {other:?}"),
        };

        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].path, "/items");
        assert_eq!(bindings[0].verbs, [Verb::Get].into_iter().collect::<VerbSet>());
        assert_eq!(bindings[1].verbs, [Verb::Post].into_iter().collect::<VerbSet>());

        let request = ScriptRequest {
            body: json!({ "name": "widget" }),
            ..ScriptRequest::default()
        };
        let response = bindings[1].handler.call(request).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.body, Some(json!({ "name": "widget" })));
    }

    #[tokio::test]
    async fn methods_default_to_every_verb() {
        let source = r#"
            fn any() { "ok" }
            fn routes() { [ #{ path: "/any", handler: "any" } ] }
        "#;
        assert_matches!(descriptor(source).await, MountDescriptor::Router { bindings } => {
            assert_eq!(bindings[0].verbs, Verb::all());
        });
    }

    #[tokio::test]
    async fn malformed_bundle_falls_back_to_handle() {
        let source = r#"
            fn handle() { "fallback" }
            fn routes() { [ #{ path: "relative", handler: "handle" } ] }
        "#;
        assert_matches!(descriptor(source).await, MountDescriptor::Handler { .. });
    }

    #[tokio::test]
    async fn bundle_naming_missing_function_is_ignored() {
        let source = r#"fn routes() { [ #{ path: "/x", handler: "nowhere" } ] }"#;
        assert!(descriptor(source).await.is_none());
    }

    #[tokio::test]
    async fn bundle_with_unknown_method_is_ignored() {
        let source = r#"
            fn h() { 1 }
            fn routes() { [ #{ path: "/x", methods: ["TRACE"], handler: "h" } ] }
        "#;
        assert!(descriptor(source).await.is_none());
    }

    #[tokio::test]
    async fn empty_bundle_is_ignored() {
        assert!(descriptor("fn routes() { [] }").await.is_none());
    }

    #[tokio::test]
    async fn throwing_bundle_is_ignored() {
        let source = r#"
            fn handle() { 1 }
            fn routes() { throw "not today"; }
        "#;
        assert_matches!(descriptor(source).await, MountDescriptor::Handler { .. });
    }

    #[tokio::test]
    async fn closures_are_rejected_as_handlers() {
        let source = r#"fn routes() { [ #{ path: "/x", handler: |r| 1 } ] }"#;
        assert!(descriptor(source).await.is_none());
    }
}
