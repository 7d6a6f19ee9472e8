//! One invocation interface for every mounted handler.
//!
//! The dispatch table stores `Arc<dyn RouteHandler>` and never cares how a
//! handler runs. [`ScriptFunction`] runs a script function on the blocking
//! pool under the call deadline; [`AsyncFnHandler`] wraps a native async
//! closure. Both are awaited the same way.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::BoxFuture;
use rhai::{Dynamic, Map};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::loader::LoadedModule;
use super::sandbox::{is_terminated, run_with_deadline, Outcome};

/// An inbound request as seen by a handler.
///
/// Scripts receive this as an object map:
/// `#{ method, path, query, headers, body }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptRequest {
    pub method: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

/// What a handler produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// `None` means an empty body.
    pub body: Option<Value>,
}

impl ScriptResponse {
    /// A JSON response with no extra headers.
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Some(body),
        }
    }

    /// Interpret a script's return value.
    ///
    /// - `()` becomes `204 No Content`.
    /// - A map whose `status` is an integer in `100..=599` is a full
    ///   response; `body` and `headers` are optional.
    /// - Anything else, including a map with a non-integer or out-of-range
    ///   `status`, is serialized as a `200` JSON body.
    pub fn from_dynamic(value: Dynamic) -> Result<Self, InvokeError> {
        if value.is_unit() {
            return Ok(Self {
                status: 204,
                headers: Vec::new(),
                body: None,
            });
        }

        if let Some(map) = value.clone().try_cast::<Map>() {
            if let Some(status) = map.get("status").and_then(status_code) {
                return full_response(&map, status);
            }
        }

        Ok(Self::json(200, to_json(&value)?))
    }
}

fn status_code(status: &Dynamic) -> Option<u16> {
    status
        .as_int()
        .ok()
        .and_then(|code| u16::try_from(code).ok())
        .filter(|code| (100..=599).contains(code))
}

fn full_response(map: &Map, status: u16) -> Result<ScriptResponse, InvokeError> {
    let body = match map.get("body") {
        None => None,
        Some(body) if body.is_unit() => None,
        Some(body) => Some(to_json(body)?),
    };

    let headers = match map.get("headers") {
        None => Vec::new(),
        Some(headers) => headers
            .clone()
            .try_cast::<Map>()
            .ok_or_else(|| InvokeError::InvalidResponse("`headers` must be an object map".into()))?
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
    };

    Ok(ScriptResponse {
        status,
        headers,
        body,
    })
}

fn to_json(value: &Dynamic) -> Result<Value, InvokeError> {
    rhai::serde::from_dynamic::<Value>(value)
        .map_err(|e| InvokeError::InvalidResponse(e.to_string()))
}

/// Errors raised while invoking a mounted handler.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("Script error: {0}")]
    Script(String),

    #[error("Script timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Invalid script response: {0}")]
    InvalidResponse(String),

    #[error("Handler crashed: {0}")]
    Crashed(String),
}

/// Anything that can serve a request mounted in the dispatch table.
#[async_trait]
pub trait RouteHandler: fmt::Debug + Send + Sync {
    async fn call(&self, request: ScriptRequest) -> Result<ScriptResponse, InvokeError>;
}

/// A named function of a loaded script module.
pub struct ScriptFunction {
    module: Arc<LoadedModule>,
    name: String,
    arity: usize,
}

impl ScriptFunction {
    /// `arity` must be 0 or 1; with 1 the request map is passed in.
    pub fn new(module: Arc<LoadedModule>, name: impl Into<String>, arity: usize) -> Self {
        Self {
            module,
            name: name.into(),
            arity,
        }
    }
}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFunction")
            .field("module", self.module.identity())
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

#[async_trait]
impl RouteHandler for ScriptFunction {
    async fn call(&self, request: ScriptRequest) -> Result<ScriptResponse, InvokeError> {
        let args = if self.arity == 0 {
            Vec::new()
        } else {
            vec![rhai::serde::to_dynamic(&request).map_err(|e| InvokeError::Script(e.to_string()))?]
        };

        let value = invoke(Arc::clone(&self.module), self.name.clone(), args).await?;
        ScriptResponse::from_dynamic(value)
    }
}

/// Call `name` on `module` from async code, under the module's call timeout.
pub(crate) async fn invoke(
    module: Arc<LoadedModule>,
    name: String,
    args: Vec<Dynamic>,
) -> Result<Dynamic, InvokeError> {
    let timeout = module.limits().call_timeout;
    let started = Instant::now();

    let outcome = run_with_deadline(timeout, move |deadline| {
        module.call_fn(&name, args, deadline).map_err(|e| {
            if is_terminated(&e) {
                None
            } else {
                Some(e.to_string())
            }
        })
    })
    .await;

    let timed_out = || InvokeError::Timeout {
        elapsed_ms: started.elapsed().as_millis() as u64,
    };

    match outcome {
        Outcome::Finished(Ok(value)) => Ok(value),
        Outcome::Finished(Err(Some(msg))) => Err(InvokeError::Script(msg)),
        Outcome::Finished(Err(None)) | Outcome::TimedOut => Err(timed_out()),
        Outcome::Panicked(msg) => Err(InvokeError::Crashed(msg)),
    }
}

/// Boxed future returned by native handlers.
pub type HandlerFuture = BoxFuture<'static, Result<ScriptResponse, InvokeError>>;

/// A native async closure mounted as a handler.
pub struct AsyncFnHandler {
    name: String,
    func: Box<dyn Fn(ScriptRequest) -> HandlerFuture + Send + Sync>,
}

impl AsyncFnHandler {
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(ScriptRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ScriptResponse, InvokeError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(move |request| -> HandlerFuture { Box::pin(func(request)) }),
        }
    }
}

impl fmt::Debug for AsyncFnHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFnHandler")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RouteHandler for AsyncFnHandler {
    async fn call(&self, request: ScriptRequest) -> Result<ScriptResponse, InvokeError> {
        (self.func)(request).await
    }
}
