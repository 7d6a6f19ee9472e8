//! Integration tests for requests served from the dispatch table.

mod common;

use axum::http::{Method, StatusCode};
use common::{app_in_tempdir, body_json, build_test_app, get, send, test_config, upload};
use serde_json::json;

// ---------------------------------------------------------------------------
// Test: unbound verb is 405 with an Allow header
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unbound_verb_is_method_not_allowed() {
    let (_dir, app) = app_in_tempdir().await;
    let source = r#"
        fn read() { "ok" }
        fn routes() { [ #{ path: "/read-only", methods: ["GET"], handler: "read" } ] }
    "#;
    upload(&app, "ro.rhai", source).await;

    let response = send(&app, Method::DELETE, "/read-only", None).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()["allow"], "GET");
    assert_eq!(body_json(response).await["code"], "METHOD_NOT_ALLOWED");
}

#[tokio::test]
async fn unsupported_method_on_mounted_path_is_method_not_allowed() {
    let (_dir, app) = app_in_tempdir().await;
    upload(&app, "ping.rhai", "fn handle() { 1 }").await;

    let response = send(&app, Method::HEAD, "/ping", None).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        response.headers()["allow"],
        "GET, POST, PUT, PATCH, DELETE"
    );
}

// ---------------------------------------------------------------------------
// Test: handler failures surface as JSON errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn throwing_handler_is_500() {
    let (_dir, app) = app_in_tempdir().await;
    upload(&app, "boom.rhai", r#"fn handle() { throw "kaboom"; }"#).await;

    let response = get(&app, "/boom").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    assert_eq!(json["code"], "SCRIPT_ERROR");
    assert!(json["detail"].as_str().unwrap().contains("kaboom"));
}

#[tokio::test]
async fn runaway_handler_is_gateway_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.script_max_operations = 0;
    let app = build_test_app(config).await;
    upload(&app, "spin.rhai", "fn handle() { loop { } }").await;

    let response = get(&app, "/spin").await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body_json(response).await["code"], "SCRIPT_TIMEOUT");
}

#[tokio::test]
async fn unit_return_is_no_content() {
    let (_dir, app) = app_in_tempdir().await;
    upload(&app, "noop.rhai", "fn handle() { }").await;

    let response = send(&app, Method::POST, "/noop", None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn script_response_headers_are_returned() {
    let (_dir, app) = app_in_tempdir().await;
    let source = r#"
        fn handle() {
            #{ status: 202, headers: #{ "x-script-version": "2" }, body: #{ queued: true } }
        }
    "#;
    upload(&app, "queue.rhai", source).await;

    let response = get(&app, "/queue").await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers()["x-script-version"], "2");
    assert_eq!(body_json(response).await, json!({ "queued": true }));
}

#[tokio::test]
async fn string_status_field_is_part_of_a_200_body() {
    let (_dir, app) = app_in_tempdir().await;
    upload(&app, "summary.rhai", r#"fn handle() { #{ status: "ok", items: [1, 2] } }"#).await;

    let response = get(&app, "/summary").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "status": "ok", "items": [1, 2] })
    );
}

// ---------------------------------------------------------------------------
// Test: concurrent uploads of different filenames all land
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_are_independent() {
    let (_dir, app) = app_in_tempdir().await;

    let uploads = (0..12).map(|i| {
        let app = app.clone();
        async move {
            let source = format!("fn handle() {{ {i} }}");
            let response = upload(&app, &format!("worker/w{i}.rhai"), &source).await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }
    });
    futures::future::join_all(uploads).await;

    for i in 0..12 {
        let json = body_json(get(&app, &format!("/worker/w{i}")).await).await;
        assert_eq!(json, json!(i));
    }

    let listing = body_json(get(&app, "/scripts/routes").await).await;
    assert_eq!(listing["data"].as_array().unwrap().len(), 12);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reuploads_of_same_file_leave_one_entry() {
    let (_dir, app) = app_in_tempdir().await;

    let uploads = (0..8).map(|i| {
        let app = app.clone();
        async move {
            upload(&app, "race.rhai", &format!("fn handle() {{ {i} }}")).await;
        }
    });
    futures::future::join_all(uploads).await;

    let response = get(&app, "/race").await;
    assert_eq!(response.status(), StatusCode::OK);

    let listing = body_json(get(&app, "/scripts/routes").await).await;
    assert_eq!(listing["data"].as_array().unwrap().len(), 1);
}
