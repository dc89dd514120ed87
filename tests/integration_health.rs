#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, clippy::clone_on_ref_ptr, unreachable_pub)]
use axum::http::StatusCode;
mod common;

#[tokio::test]
async fn test_health() {
    let app = common::TestApp::spawn().await;

    let resp = app.client.get(format!("{}/health", app.server_url)).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_unknown_route() {
    let app = common::TestApp::spawn().await;

    let resp = app.client.get(format!("{}/v1/anything", app.server_url)).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
