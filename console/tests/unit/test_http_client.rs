//! HttpClient against a mock control plane

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use openapi_client::{Environment, RunId, RunPhase};
use persephone::errors::ConsoleError;
use persephone::http::{ControlPlaneExt, HttpClient};
use secrecy::SecretString;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_test::{assert_err, assert_ok};

async fn prepare_status(Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
    let run_id = query.get("runId").cloned().unwrap_or_default();
    Json(json!({
        "runId": run_id,
        "phase": "Running",
        "steps": [
            {"name": "pull-image", "status": "Succeeded", "completedAt": "2026-03-01T10:00:00Z"},
            {"name": "warmup", "status": "Running", "message": "loading weights"}
        ],
        "updatedAt": "2026-03-01T10:00:05Z"
    }))
}

async fn prepare_start(
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some("Bearer t0k");
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Missing token"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "runId": query.get("runId"),
            "phase": "Pending",
            "steps": [{"name": format!("reserve-{}", query.get("gpuId").map(String::as_str).unwrap_or("none")), "status": "Pending"}],
            "updatedAt": null
        })),
    )
}

async fn deploy_status() -> impl IntoResponse {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"message": "Upstream busy"})),
    )
}

async fn deploy_start(Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
    let env = query.get("env").cloned().unwrap_or_default();
    Json(json!({"runId": "r1", "environment": env, "phase": "pending"}))
}

async fn monitor_summary() -> impl IntoResponse {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({"detail": "runId is required"})),
    )
}

async fn list_gpus() -> impl IntoResponse {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn upload(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let multipart = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&body);
    if !multipart
        || !body.contains("name=\"file\"")
        || !body.contains("filename=\"model.onnx\"")
        || !body.contains("onnx-bytes")
    {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "bad upload"})));
    }
    (StatusCode::OK, Json(json!({"runId": "r1"})))
}

async fn spawn_control_plane() -> SocketAddr {
    let app = Router::new()
        .route("/api/upload", post(upload))
        .route("/api/prepare/gpus", get(list_gpus))
        .route("/api/prepare/start", post(prepare_start))
        .route("/api/prepare/status", get(prepare_status))
        .route("/api/deploy/start", post(deploy_start))
        .route("/api/deploy/status", get(deploy_status))
        .route("/api/monitor/summary", get(monitor_summary));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client(addr: SocketAddr, token: Option<&str>) -> HttpClient {
    HttpClient::new(
        &format!("http://{}/api/", addr),
        token.map(|t| SecretString::from(t.to_string())),
    )
    .unwrap()
}

#[tokio::test]
async fn test_status_payload_parsed() {
    let addr = spawn_control_plane().await;
    let client = client(addr, None);
    assert_eq!(client.base_url(), format!("http://{}/api", addr));

    let status = assert_ok!(client.prepare_status(&RunId::new("r1")).await);
    assert_eq!(status.run_id, RunId::new("r1"));
    assert_eq!(status.phase, RunPhase::Running);
    assert_eq!(status.steps.len(), 2);
    assert_eq!(status.steps[0].name, "pull-image");
    assert_eq!(status.steps[1].message.as_deref(), Some("loading weights"));
    assert!(status.updated_at.is_some());
}

#[tokio::test]
async fn test_bearer_token_sent() {
    let addr = spawn_control_plane().await;

    let err = assert_err!(
        client(addr, None)
            .prepare_start(&RunId::new("r1"), Some("a100"))
            .await
    );
    assert_eq!(err.user_message().as_deref(), Some("Missing token"));

    let status = assert_ok!(
        client(addr, Some("t0k"))
            .prepare_start(&RunId::new("r1"), Some("a100"))
            .await
    );
    assert_eq!(status.phase, RunPhase::Pending);
    assert_eq!(status.steps[0].name, "reserve-a100");
}

#[tokio::test]
async fn test_server_message_surfaces_verbatim() {
    let addr = spawn_control_plane().await;
    let err = assert_err!(
        client(addr, None)
            .deploy_status(&RunId::new("r1"), Environment::Stage)
            .await
    );
    match err {
        ConsoleError::Api { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "Upstream busy");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_detail_used_when_message_absent() {
    let addr = spawn_control_plane().await;
    let err = assert_err!(client(addr, None).monitor_summary(&RunId::new("r1")).await);
    assert_eq!(err.user_message().as_deref(), Some("runId is required"));
}

#[tokio::test]
async fn test_generic_message_without_body() {
    let addr = spawn_control_plane().await;
    let err = assert_err!(client(addr, None).list_gpus(&RunId::new("r1")).await);
    assert_eq!(
        err.user_message().as_deref(),
        Some("Request failed with status 500")
    );
}

#[tokio::test]
async fn test_environment_sent_and_echoed() {
    let addr = spawn_control_plane().await;
    let status = assert_ok!(
        client(addr, None)
            .deploy_start(&RunId::new("r1"), Environment::Prod)
            .await
    );
    assert_eq!(status.environment, Environment::Prod);
    assert_eq!(status.phase, RunPhase::Pending);
}

#[tokio::test]
async fn test_multipart_upload() {
    let addr = spawn_control_plane().await;
    let response = assert_ok!(
        client(addr, None)
            .upload("model.onnx".to_string(), b"onnx-bytes".to_vec())
            .await
    );
    assert_eq!(response.run_id, RunId::new("r1"));
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = assert_err!(client(addr, None).prepare_status(&RunId::new("r1")).await);
    assert!(err.is_transport());
    assert_eq!(err.user_message(), None);
}
