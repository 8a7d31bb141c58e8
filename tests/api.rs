//! HTTP-level tests for a single node.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use signed_ledger::crypto::generate_keypair;
use signed_ledger::ledger::Ledger;
use signed_ledger::model::Block;
use signed_ledger::storage::ChainStore;
use signed_ledger::sync::PeerBroadcaster;
use signed_ledger::{router, AppState};

fn test_state(dir: &Path) -> AppState {
    let store = ChainStore::new(dir.join("chain-Test.json"), Arc::new(generate_keypair()));
    AppState {
        ledger: Arc::new(Ledger::new(store)),
        peers: Arc::new(PeerBroadcaster::new(Vec::new(), Duration::from_millis(500)).unwrap()),
        node_name: Arc::from("Test"),
    }
}

async fn call(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn to_json(block: &Block) -> Value {
    serde_json::to_value(block).unwrap()
}

#[tokio::test]
async fn fresh_node_serves_genesis() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let (status, chain) = call(&app, "GET", "/chain", None).await;
    assert_eq!(status, StatusCode::OK);
    let chain = chain.as_array().unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0]["index"], 0);
    assert_eq!(chain[0]["previousHash"], "0");
    assert_eq!(chain[0]["data"]["message"], "Genesis Block");
}

#[tokio::test]
async fn add_block_then_validate() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let (_, chain) = call(&app, "GET", "/chain", None).await;
    let genesis_hash = chain[0]["hash"].clone();

    let (status, body) = call(&app, "POST", "/add-block", Some(json!({ "x": 1 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Block added");
    assert_eq!(body["block"]["index"], 1);
    assert_eq!(body["block"]["previousHash"], genesis_hash);
    assert_eq!(body["block"]["data"], json!({ "x": 1 }));

    let (status, body) = call(&app, "GET", "/validate", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "valid": true }));

    let (_, chain) = call(&app, "GET", "/chain", None).await;
    assert_eq!(chain.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn sync_block_enforces_tip_linkage() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));
    let peer_key = generate_keypair();

    let (_, chain) = call(&app, "GET", "/chain", None).await;
    let tip_hash = chain[0]["hash"].as_str().unwrap().to_string();

    let stray = Block::create(1, "2024-01-01T00:00:00.000Z", json!("x"), "not-the-tip")
        .sign(&peer_key.signing);
    let (status, body) = call(&app, "POST", "/sync-block", Some(to_json(&stray))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid chain sequence" }));
    let (_, chain) = call(&app, "GET", "/chain", None).await;
    assert_eq!(chain.as_array().unwrap().len(), 1);

    let next = Block::create(1, "2024-01-01T00:00:00.000Z", json!("x"), tip_hash)
        .sign(&peer_key.signing);
    let (status, body) = call(&app, "POST", "/sync-block", Some(to_json(&next))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Synced successfully");

    let (_, chain) = call(&app, "GET", "/chain", None).await;
    let chain = chain.as_array().unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[1], to_json(&next));

    // Stored as received: foreign signature makes the local chain invalid.
    let (_, body) = call(&app, "GET", "/validate", None).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["fault"]["kind"], "bad_signature");
}

#[tokio::test]
async fn malformed_bodies_get_json_errors() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let (status, body) = call(&app, "POST", "/sync-block", Some(json!({ "index": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "request body has the wrong shape" }));

    let request = Request::builder()
        .method("POST")
        .uri("/sync-block")
        .header("content-type", "application/json")
        .body(Body::from("{ not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "request body is not valid JSON");

    let request = Request::builder()
        .method("POST")
        .uri("/add-block")
        .body(Body::from(r#"{"x":1}"#))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "expected Content-Type: application/json");

    let (_, chain) = call(&app, "GET", "/chain", None).await;
    assert_eq!(chain.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn float_payload_keeps_chain_loadable() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let payload: Value = serde_json::from_str(r#"{"v": 3.3270252282108667e+190}"#).unwrap();
    let (status, _) = call(&app, "POST", "/add-block", Some(payload)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, "GET", "/validate", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    let (status, _) = call(&app, "POST", "/add-block", Some(json!(2))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn tampered_file_is_not_served() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let path = state.ledger.store().path().to_path_buf();
    let app = router(state);

    call(&app, "POST", "/add-block", Some(json!({ "amount": 10 }))).await;

    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    std::fs::write(&path, text.replace("\"amount\": 10", "\"amount\": 99")).unwrap();

    let (status, body) = call(&app, "GET", "/chain", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("tampered"));

    let (status, _) = call(&app, "POST", "/add-block", Some(json!(1))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn reset_archives_and_starts_over() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    call(&app, "POST", "/add-block", Some(json!("a"))).await;
    call(&app, "POST", "/add-block", Some(json!("b"))).await;

    let (status, body) = call(&app, "POST", "/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Test reset successfully");
    assert!(body["file"].as_str().unwrap().ends_with("chain-Test.json"));
    let backup = body["backup"].as_str().unwrap();
    assert!(Path::new(backup).exists());

    let (_, chain) = call(&app, "GET", "/chain", None).await;
    assert_eq!(chain.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn reset_recovers_from_tampering() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let path = state.ledger.store().path().to_path_buf();
    let app = router(state);

    call(&app, "GET", "/chain", None).await;
    std::fs::remove_file(&path).unwrap();
    std::fs::write(&path, r#"{"chain":[],"signature":"AAAA"}"#).unwrap();

    let (status, _) = call(&app, "GET", "/validate", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, _) = call(&app, "POST", "/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(&app, "GET", "/validate", None).await;
    assert_eq!(body["valid"], true);
}

#[tokio::test]
async fn pubkey_and_health() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let expected = state.ledger.store().keys().public_hex();
    let app = router(state);

    let (status, body) = call(&app, "GET", "/pubkey", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pubkey_hex"], expected);

    let (_, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(body, json!({ "status": "ok", "node": "Test" }));
}
