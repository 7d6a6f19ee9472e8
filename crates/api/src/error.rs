use axum::http::header::ALLOW;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use scaffold_core::error::CoreError;
use scaffold_core::routing::table::LookupError;
use scaffold_core::routing::verb::VerbSet;
use scaffold_core::scripting::handler::InvokeError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`InvokeError`] and adds the dispatch variants.
/// Implements [`IntoResponse`] to produce consistent `{ code, detail }`
/// JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `scaffold_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A mounted handler failed while serving a request.
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    /// Nothing is mounted at the requested path.
    #[error("No route mounted at {0}")]
    NotFound(String),

    /// The path is mounted but not for this method.
    #[error("Method {method} not allowed")]
    MethodNotAllowed { method: String, allowed: VerbSet },
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<LookupError> for AppError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::NotFound(path) => AppError::NotFound(path),
            LookupError::MethodNotAllowed { verb, allowed, .. } => AppError::MethodNotAllowed {
                method: verb.to_string(),
                allowed,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, detail) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::PathEscape(_) => {
                    (StatusCode::BAD_REQUEST, "PATH_ESCAPE", core.to_string())
                }
                CoreError::Load(failure) => (
                    StatusCode::BAD_REQUEST,
                    "SCRIPT_LOAD_FAILED",
                    failure.to_string(),
                ),
                CoreError::Storage(err) => {
                    tracing::error!(error = %err, "Script storage error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "STORAGE_ERROR",
                        "Failed to write script".to_string(),
                    )
                }
            },

            // --- Mounted handler errors ---
            AppError::Invoke(err) => match err {
                InvokeError::Timeout { .. } => {
                    tracing::warn!(error = %err, "Script handler timed out");
                    (StatusCode::GATEWAY_TIMEOUT, "SCRIPT_TIMEOUT", err.to_string())
                }
                InvokeError::Crashed(_) => {
                    tracing::error!(error = %err, "Script handler crashed");
                    (StatusCode::INTERNAL_SERVER_ERROR, "SCRIPT_ERROR", err.to_string())
                }
                InvokeError::Script(_) | InvokeError::InvalidResponse(_) => {
                    tracing::warn!(error = %err, "Script handler failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, "SCRIPT_ERROR", err.to_string())
                }
            },

            // --- Dispatch errors ---
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            AppError::MethodNotAllowed { .. } => (
                StatusCode::METHOD_NOT_ALLOWED,
                "METHOD_NOT_ALLOWED",
                self.to_string(),
            ),
        };

        let body = json!({
            "code": code,
            "detail": detail,
        });

        let mut response = (status, axum::Json(body)).into_response();

        if let AppError::MethodNotAllowed { allowed, .. } = &self {
            let allow = allowed
                .iter()
                .map(|verb| verb.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.headers_mut().insert(ALLOW, value);
            }
        }

        response
    }
}
