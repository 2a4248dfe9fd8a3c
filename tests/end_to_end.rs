//! Drives the merged HTTP + MCP router the way `serve()` assembles it,
//! covering the server's request/response contract rather than individual
//! module internals.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use publisher::malloy::FakeMalloyRuntime;
use publisher::state::AppState;
use publisher::{http, mcp};
use tower::ServiceExt;

async fn test_app(dir: &std::path::Path) -> axum::Router {
    let state = AppState::init(dir.to_path_buf(), Arc::new(FakeMalloyRuntime::new()))
        .await
        .expect("state initializes");
    http::router(state.clone()).merge(mcp::transport::router(state))
}

fn write_fixture(dir: &std::path::Path) {
    let pkg_dir = dir.join("home").join("faa");
    std::fs::create_dir_all(&pkg_dir).unwrap();
    std::fs::write(
        pkg_dir.join("flights.malloy"),
        "source: flights is duckdb.table('f')\nquery: top_carriers is flights -> x",
    )
    .unwrap();
    let config = serde_json::json!({
        "frozenConfig": false,
        "projects": [{
            "name": "home",
            "packages": [{ "name": "faa", "location": pkg_dir.to_str().unwrap() }],
            "connections": [{ "type": "duckdb", "name": "duckdb", "attributes": {} }],
        }],
    });
    std::fs::write(dir.join("publisher.config.json"), config.to_string()).unwrap();
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check_reports_counters() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let app = test_app(dir.path()).await;

    let response = app
        .oneshot(Request::get("/api/v0/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn list_projects_returns_the_fixture_project() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let app = test_app(dir.path()).await;

    let response = app
        .oneshot(Request::get("/api/v0/projects").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body[0]["name"], "home");
}

#[tokio::test]
async fn version_id_query_param_is_uniformly_not_implemented() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let app = test_app(dir.path()).await;

    let response = app
        .oneshot(
            Request::get("/api/v0/projects/home/packages/faa?versionId=5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn get_package_roundtrips_models() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let app = test_app(dir.path()).await;

    let response = app
        .oneshot(
            Request::get("/api/v0/projects/home/packages/faa")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["models"][0], "flights.malloy");
}

#[tokio::test]
async fn nonexistent_package_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let app = test_app(dir.path()).await;

    let response = app
        .oneshot(
            Request::get("/api/v0/projects/home/packages/missing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mcp_resources_read_reports_suggestions_for_missing_package() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let app = test_app(dir.path()).await;

    let request_body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "resources/read",
        "params": { "uri": "malloy://project/home/package/missing" },
    });
    let response = app
        .oneshot(
            Request::post("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(request_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let contents = &body["result"]["contents"][0];
    assert_eq!(body["result"]["isError"], true);
    let payload: serde_json::Value = serde_json::from_str(contents["text"].as_str().unwrap()).unwrap();
    assert!(payload["error"].as_str().unwrap().starts_with("Resource not found: Package"));
    assert!(!payload["suggestions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn mcp_execute_query_xor_violation_is_canonical() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let app = test_app(dir.path()).await;

    let request_body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "tools/call",
        "params": {
            "name": "malloy_executeQuery",
            "arguments": {
                "projectName": "home",
                "packageName": "faa",
                "modelPath": "flights.malloy",
                "query": "SELECT 1",
                "queryName": "top_carriers",
            },
        },
    });
    let response = app
        .oneshot(
            Request::post("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(request_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["result"]["isError"], true);
    assert_eq!(
        body["result"]["content"][0]["text"],
        "MCP error -32602: Cannot provide both 'query' and 'queryName'"
    );
}

#[tokio::test]
async fn mcp_execute_ad_hoc_query_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let app = test_app(dir.path()).await;

    let request_body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 3,
        "method": "tools/call",
        "params": {
            "name": "malloy_executeQuery",
            "arguments": {
                "projectName": "home",
                "packageName": "faa",
                "modelPath": "flights.malloy",
                "query": "run: flights->{ aggregate: c is count() }",
            },
        },
    });
    let response = app
        .oneshot(
            Request::post("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(request_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["result"]["isError"], false);
    assert!(body["result"]["content"][0]["uri"].as_str().unwrap().contains("#result"));
}

#[tokio::test]
async fn watch_mode_lifecycle_is_reachable_over_http() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let app = test_app(dir.path()).await;

    let start_response = app
        .clone()
        .oneshot(
            Request::post("/api/v0/watchMode/start")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::json!({ "projectName": "home" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(start_response.status(), StatusCode::OK);

    let status_response = app
        .oneshot(Request::get("/api/v0/watchMode/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(status_response).await;
    assert_eq!(body["enabled"], true);
    assert_eq!(body["projectName"], "home");
    assert!(body["watchingPath"].as_str().unwrap().contains("home"));
}
