#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, clippy::clone_on_ref_ptr, unreachable_pub)]
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use fcm_relay::adapters::push::auth::TokenProvider;
use fcm_relay::adapters::push::{FcmGateway, PushError, PushGateway};
use fcm_relay::config::Config;
use fcm_relay::domain::notification::Notification;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

const STUB_ACCESS_TOKEN: &str = "stub-access-token";

/// Emulates the FCM v1 send endpoint and the metadata token server on one listener.
#[derive(Clone, Default)]
struct StubFcm {
    token_fetches: Arc<AtomicUsize>,
    sends: Arc<Mutex<Vec<(String, Value)>>>,
    /// Rejects the next send with a bare 401 even if its bearer token is valid, as after a key rotation.
    reject_next_auth: Arc<AtomicBool>,
}

async fn metadata_token(State(stub): State<StubFcm>, headers: HeaderMap) -> Response {
    if headers.get("metadata-flavor").and_then(|v| v.to_str().ok()) != Some("Google") {
        return StatusCode::FORBIDDEN.into_response();
    }
    stub.token_fetches.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "access_token": STUB_ACCESS_TOKEN, "expires_in": 3599, "token_type": "Bearer" })).into_response()
}

async fn metadata_project() -> &'static str {
    "stub-project"
}

fn google_error(status: StatusCode, google_status: &str, error_code: &str) -> Response {
    let body = json!({
        "error": {
            "code": status.as_u16(),
            "message": format!("stub {error_code}"),
            "status": google_status,
            "details": [{
                "@type": "type.googleapis.com/google.firebase.fcm.v1.FcmError",
                "errorCode": error_code
            }]
        }
    });
    (status, Json(body)).into_response()
}

async fn send(
    State(stub): State<StubFcm>,
    Path(project): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let expected = format!("Bearer {STUB_ACCESS_TOKEN}");
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(expected.as_str()) {
        return google_error(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", "THIRD_PARTY_AUTH_ERROR");
    }
    if stub.reject_next_auth.swap(false, Ordering::SeqCst) {
        let body = json!({ "error": { "code": 401, "message": "Request had invalid authentication credentials.", "status": "UNAUTHENTICATED" } });
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }

    let index = {
        let mut sends = stub.sends.lock().unwrap();
        sends.push((project.clone(), body.clone()));
        sends.len()
    };

    match body["message"]["token"].as_str() {
        Some("dead") => google_error(StatusCode::NOT_FOUND, "NOT_FOUND", "UNREGISTERED"),
        Some("bad") => google_error(StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", "INVALID_ARGUMENT"),
        Some("busy") => (StatusCode::SERVICE_UNAVAILABLE, "upstream busy").into_response(),
        _ => Json(json!({ "name": format!("projects/{project}/messages/{index}") })).into_response(),
    }
}

async fn spawn_stub() -> (StubFcm, String) {
    fcm_relay::telemetry::init_test_telemetry();
    let stub = StubFcm::default();
    let router = Router::new()
        .route("/computeMetadata/v1/instance/service-accounts/default/token", get(metadata_token))
        .route("/computeMetadata/v1/project/project-id", get(metadata_project))
        .route("/v1/projects/{project}/messages:send", post(send))
        .with_state(stub.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (stub, addr.to_string())
}

fn gateway(addr: &str) -> FcmGateway {
    let http = reqwest::Client::new();
    let credentials = TokenProvider::from_metadata_server(http.clone(), addr);
    FcmGateway::new(http, &format!("http://{addr}"), "stub-project", credentials, 4)
}

fn notification() -> Notification {
    Notification {
        title: "Hello".into(),
        body: "World".into(),
        data: HashMap::from([("order_id".to_string(), "42".to_string())]),
    }
}

#[tokio::test]
async fn test_send_to_token_wire_format() {
    let (stub, addr) = spawn_stub().await;
    let gateway = gateway(&addr);

    let id = gateway.send_to_token("device-1", &notification()).await.unwrap();
    assert_eq!(id, "projects/stub-project/messages/1");

    let sends = stub.sends.lock().unwrap().clone();
    assert_eq!(sends[0].0, "stub-project");
    assert_eq!(
        sends[0].1,
        json!({
            "message": {
                "token": "device-1",
                "notification": { "title": "Hello", "body": "World" },
                "data": { "order_id": "42" }
            }
        })
    );
}

#[tokio::test]
async fn test_send_to_topic_returns_name() {
    let (stub, addr) = spawn_stub().await;
    let gateway = gateway(&addr);

    let id = gateway.send_to_topic("sports", &notification()).await.unwrap();
    assert_eq!(id, "projects/stub-project/messages/1");
    assert_eq!(stub.sends.lock().unwrap()[0].1["message"]["topic"], "sports");
}

#[tokio::test]
async fn test_access_token_is_cached() {
    let (stub, addr) = spawn_stub().await;
    let gateway = gateway(&addr);

    for token in ["a", "b", "c"] {
        gateway.send_to_token(token, &notification()).await.unwrap();
    }
    assert_eq!(stub.token_fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejected_access_token_is_refetched() {
    let (stub, addr) = spawn_stub().await;
    let gateway = gateway(&addr);

    gateway.send_to_token("a", &notification()).await.unwrap();
    assert_eq!(stub.token_fetches.load(Ordering::SeqCst), 1);

    stub.reject_next_auth.store(true, Ordering::SeqCst);
    let err = gateway.send_to_token("b", &notification()).await.unwrap_err();
    assert!(matches!(err, PushError::Auth(_)));
    assert!(err.is_retryable());
    assert_eq!(stub.token_fetches.load(Ordering::SeqCst), 1);

    gateway.send_to_token("c", &notification()).await.unwrap();
    assert_eq!(stub.token_fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_error_responses_are_classified() {
    let (_stub, addr) = spawn_stub().await;
    let gateway = gateway(&addr);

    let err = gateway.send_to_token("dead", &notification()).await.unwrap_err();
    assert!(matches!(err, PushError::Unregistered));

    let err = gateway.send_to_token("bad", &notification()).await.unwrap_err();
    assert!(matches!(err, PushError::InvalidArgument(ref m) if m == "stub INVALID_ARGUMENT"));
    assert!(!err.is_retryable());

    let err = gateway.send_to_token("busy", &notification()).await.unwrap_err();
    assert!(matches!(err, PushError::Unavailable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_multicast_reports_in_token_order() {
    let (_stub, addr) = spawn_stub().await;
    let gateway = gateway(&addr);

    let tokens: Vec<String> = ["a", "dead", "b", "bad", "c"].iter().map(ToString::to_string).collect();
    let report = gateway.send_multicast(&tokens, &notification()).await.unwrap();

    let order: Vec<&str> = report.responses.iter().map(|r| r.token.as_str()).collect();
    assert_eq!(order, vec!["a", "dead", "b", "bad", "c"]);
    assert_eq!(report.success_count(), 3);
    assert_eq!(report.failure_count(), 2);
    assert_eq!(report.unregistered_tokens().collect::<Vec<_>>(), vec!["dead"]);
}

#[tokio::test]
async fn test_credential_outage_is_retryable() {
    let (_stub, addr) = spawn_stub().await;
    let http = reqwest::Client::new();
    // Nothing listens on port 1.
    let credentials = TokenProvider::from_metadata_server(http.clone(), "127.0.0.1:1");
    let gateway = FcmGateway::new(http, &format!("http://{addr}"), "stub-project", credentials, 4);

    let err = gateway.send_to_token("device-1", &notification()).await.unwrap_err();
    assert!(matches!(err, PushError::Auth(_)));
    assert!(err.is_retryable());

    let err = gateway.send_multicast(&["x".to_string()], &notification()).await.unwrap_err();
    assert!(matches!(err, PushError::Auth(_)));
}

#[tokio::test]
async fn test_unreachable_fcm_is_unavailable() {
    let (_stub, addr) = spawn_stub().await;
    let http = reqwest::Client::new();
    let credentials = TokenProvider::from_metadata_server(http.clone(), &addr);
    let gateway = FcmGateway::new(http, "http://127.0.0.1:1", "stub-project", credentials, 4);

    let err = gateway.send_to_topic("news", &notification()).await.unwrap_err();
    assert!(matches!(err, PushError::Unavailable(_)));
}

#[tokio::test]
async fn test_from_config_discovers_project() {
    let (stub, addr) = spawn_stub().await;
    let base_url = format!("http://{addr}");
    let config = Config::try_parse_from([
        "fcm-relay",
        "--base-url",
        base_url.as_str(),
        "--metadata-host",
        addr.as_str(),
        "--project-id",
        "configured-project",
    ])
    .unwrap();

    let gateway = FcmGateway::from_config(&config.fcm).await.unwrap();
    let id = gateway.send_to_token("device-1", &notification()).await.unwrap();
    assert_eq!(id, "projects/configured-project/messages/1");

    let credentials = TokenProvider::from_metadata_server(reqwest::Client::new(), &addr);
    assert_eq!(credentials.discover_project_id().await.unwrap(), "stub-project");
    assert_eq!(stub.sends.lock().unwrap().len(), 1);
}
