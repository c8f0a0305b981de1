//! Security tests for the admin recovery-file view
//!
//! - Routes are absent (404) when no admin secret is configured
//! - Wrong or missing secret is rejected (403)
//! - File names outside `[A-Za-z0-9_-]+.json` are refused

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use pqa_common::content::ContentCatalog;
use pqa_common::persistence::{DurableStore, LocalRecoveryStore, SqliteRowStore};
use pqa_common::session::SessionStores;
use pqa_common::AnnotatorRoster;
use pqa_ui::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

const SECRET: &str = "letmein";

const CONTENT: &str = r#"{
    "First prompt": {"a": "one", "b": "two", "c": "three", "d": "four"},
    "Second prompt": {"a": "one", "b": "two", "c": "three", "d": "four"}
}"#;

async fn setup_app(admin_secret: Option<&str>) -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    let local = LocalRecoveryStore::new(dir.path().join("recovery"));
    local.ensure_dir().await.unwrap();
    let stores = SessionStores {
        local,
        durable: DurableStore::new(Arc::new(SqliteRowStore::in_memory().await.unwrap())),
    };
    let state = AppState::new(
        ContentCatalog::from_json(CONTENT, CONTENT).unwrap(),
        AnnotatorRoster::new(["1"]).unwrap(),
        2,
        stores,
        admin_secret.map(String::from),
    );
    (dir, build_router(state))
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn status_and_body(router: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

/// Start a session and touch one field so a recovery file exists
async fn create_recovery_file(router: &Router) {
    let (status, _) = status_and_body(
        router,
        request(
            "POST",
            "/api/sessions",
            Some(json!({ "annotator_id": "1", "session_id": "1_admin001" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = status_and_body(
        router,
        request(
            "PUT",
            "/api/sessions/1/1_admin001/rank",
            Some(json!({ "slot": 1, "rank": 2 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_disabled_without_secret() {
    let (_dir, router) = setup_app(None).await;
    let (status, _) =
        status_and_body(&router, request("GET", "/admin/recovery?secret=anything", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_wrong_or_missing_secret_is_forbidden() {
    let (_dir, router) = setup_app(Some(SECRET)).await;

    for uri in [
        "/admin/recovery",
        "/admin/recovery?secret=wrong",
        "/admin/recovery/1_1_admin001.json?secret=wrong",
    ] {
        let (status, body) = status_and_body(&router, request("GET", uri, None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"]["code"], "FORBIDDEN");
    }
}

#[tokio::test]
async fn test_list_download_delete() {
    let (_dir, router) = setup_app(Some(SECRET)).await;
    create_recovery_file(&router).await;

    let (status, body) = status_and_body(
        &router,
        request("GET", &format!("/admin/recovery?secret={}", SECRET), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let listing: Value = serde_json::from_slice(&body).unwrap();
    let files = listing["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["name"], "1_1_admin001.json");

    let file_uri = format!("/admin/recovery/1_1_admin001.json?secret={}", SECRET);
    let (status, body) = status_and_body(&router, request("GET", &file_uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    let stored: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stored["fiction__First prompt"]["ranking"]["Paragraph 1"], 2);

    let (status, _) = status_and_body(&router, request("DELETE", &file_uri, None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = status_and_body(&router, request("DELETE", &file_uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_file_names_are_refused() {
    let (_dir, router) = setup_app(Some(SECRET)).await;

    for name in ["..%2Fconfig.toml", "notes.txt", "a%20b.json"] {
        let uri = format!("/admin/recovery/{}?secret={}", name, SECRET);
        let (status, _) = status_and_body(&router, request("GET", &uri, None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", name);
    }
}
