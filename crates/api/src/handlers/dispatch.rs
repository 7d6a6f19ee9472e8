//! Fallback handler serving routes mounted from uploaded scripts.
//!
//! Every request that matches no static route lands here and is resolved
//! against the [`DispatchTable`](scaffold_core::routing::table::DispatchTable)
//! at request time, so mounts take effect without rebuilding the router.

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use scaffold_core::routing::verb::Verb;
use scaffold_core::scripting::handler::{InvokeError, ScriptRequest, ScriptResponse};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Fallback: look the path up in the dispatch table and run its handler.
pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
    body: Bytes,
) -> AppResult<Response> {
    let path = uri.path().to_string();

    let Ok(verb) = method.as_str().parse::<Verb>() else {
        return Err(match state.dispatch.allowed_verbs(&path).await {
            Some(allowed) => AppError::MethodNotAllowed {
                method: method.to_string(),
                allowed,
            },
            None => AppError::NotFound(path),
        });
    };

    let handler = state.dispatch.lookup(&path, verb).await?;

    let request = ScriptRequest {
        method: verb.to_string(),
        path,
        query,
        headers: header_map(&headers),
        body: request_body(&body),
    };

    let response = handler.call(request).await?;
    Ok(into_http(response)?)
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// JSON bodies are passed through parsed; anything else as a string.
fn request_body(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn into_http(script: ScriptResponse) -> Result<Response, InvokeError> {
    let status = StatusCode::from_u16(script.status)
        .map_err(|e| InvokeError::InvalidResponse(e.to_string()))?;

    let mut response = match script.body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    };

    for (name, value) in script.headers {
        let name = HeaderName::try_from(name.as_str())
            .map_err(|e| InvokeError::InvalidResponse(format!("header name '{name}': {e}")))?;
        let value = HeaderValue::try_from(value.as_str())
            .map_err(|e| InvokeError::InvalidResponse(format!("header '{name}': {e}")))?;
        response.headers_mut().insert(name, value);
    }

    Ok(response)
}
