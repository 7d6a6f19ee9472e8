#![allow(dead_code)]

use std::path::Path;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use scaffold_api::config::ServerConfig;
use scaffold_api::router::build_app_router;
use scaffold_api::state::AppState;

/// Build a test `ServerConfig` writing scripts under `scripts_base`.
///
/// Script timeouts are short so runaway-script tests finish quickly.
pub fn test_config(scripts_base: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        scripts_base: scripts_base.to_path_buf(),
        handler_prefix: String::new(),
        script_load_timeout_ms: 500,
        script_call_timeout_ms: 500,
        script_max_operations: 1_000_000,
    }
}

/// Build the full application router with all middleware layers.
///
/// Uses the same [`build_app_router`] as `main.rs` so integration tests
/// exercise the production middleware stack.
pub async fn build_test_app(config: ServerConfig) -> Router {
    let state = AppState::new(config.clone())
        .await
        .expect("test state should build");
    build_app_router(state, &config)
}

/// Fresh temp dir plus an app serving scripts out of it.
pub async fn app_in_tempdir() -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let app = build_test_app(test_config(dir.path())).await;
    (dir, app)
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body)).await
}

/// POST a script to the ingestion endpoint.
pub async fn upload(app: &Router, filename: &str, source: &str) -> Response<Body> {
    post_json(app, "/scripts", json!({ "filename": filename, "source": source })).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
