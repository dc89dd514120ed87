#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use fcm_relay::AppBuilder;
use fcm_relay::adapters::push::MockPushGateway;
use fcm_relay::config::Config;
use fcm_relay::storage::TokenRegistry;
use reqwest::Client;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub fn get_test_config() -> Config {
    Config::try_parse_from([
        "fcm-relay",
        "--host",
        "127.0.0.1",
        "--port",
        "0",
        "--project-id",
        "test-project",
        "--register-per-second",
        "10000",
        "--register-burst",
        "10000",
        "--trusted-proxies",
        "127.0.0.1/32,::1/128",
    ])
    .unwrap()
}

pub struct TestApp {
    pub server_url: String,
    pub client: Client,
    pub gateway: Arc<MockPushGateway>,
    pub registry: TokenRegistry,
    pub config: Config,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(get_test_config()).await
    }

    pub async fn spawn_with_config(config: Config) -> Self {
        fcm_relay::telemetry::init_test_telemetry();

        let gateway = Arc::new(MockPushGateway::new());
        let registry = TokenRegistry::new();

        let router = AppBuilder::new(config.clone())
            .with_push_gateway(gateway.clone())
            .with_token_registry(registry.clone())
            .build()
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await.unwrap();
        });

        Self { server_url: format!("http://{addr}"), client: Client::new(), gateway, registry, config }
    }

    pub async fn register(&self, token: &str) -> reqwest::Response {
        self.client.post(format!("{}/register", self.server_url)).json(&json!({ "token": token })).send().await.unwrap()
    }

    /// Posts `payload` wrapped in a Pub/Sub push envelope.
    pub async fn push(&self, path: &str, payload: &Value) -> reqwest::Response {
        self.push_envelope(path, &envelope(payload)).await
    }

    pub async fn push_envelope(&self, path: &str, envelope: &Value) -> reqwest::Response {
        self.client.post(format!("{}{path}", self.server_url)).json(envelope).send().await.unwrap()
    }
}

pub fn envelope(payload: &Value) -> Value {
    raw_envelope(&STANDARD.encode(serde_json::to_vec(payload).unwrap()))
}

pub fn raw_envelope(data: &str) -> Value {
    json!({
        "subscription": "projects/test-project/subscriptions/relay-push",
        "message": {
            "data": data,
            "messageId": "1234567890",
            "publishTime": "2024-05-01T12:00:00.000Z",
            "attributes": {}
        }
    })
}

pub fn tokens(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("device-token-{i:04}")).collect()
}
