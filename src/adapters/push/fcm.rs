use crate::adapters::push::auth::TokenProvider;
use crate::adapters::push::{MulticastReport, PushError, PushGateway, SendResponse};
use crate::config::FcmConfig;
use crate::domain::notification::Notification;
use crate::domain::token::fingerprint;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const FCM_ERROR_TYPE: &str = "type.googleapis.com/google.firebase.fcm.v1.FcmError";

#[derive(Serialize)]
struct SendRequest<'a> {
    message: Message<'a>,
}

#[derive(Serialize)]
struct Message<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<&'a str>,
    notification: NotificationBody<'a>,
    #[serde(skip_serializing_if = "no_data")]
    data: &'a HashMap<String, String>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn no_data(data: &&HashMap<String, String>) -> bool {
    data.is_empty()
}

#[derive(Serialize)]
struct NotificationBody<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct SendResult {
    name: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: GoogleError,
}

#[derive(Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "@type", default)]
    type_url: String,
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
}

#[derive(Clone, Copy)]
enum Target<'a> {
    Token(&'a str),
    Topic(&'a str),
}

/// Firebase Cloud Messaging HTTP v1 client.
#[derive(Debug)]
pub struct FcmGateway {
    http: reqwest::Client,
    send_url: String,
    credentials: TokenProvider,
    multicast_concurrency: usize,
}

impl FcmGateway {
    /// Builds a gateway from configuration, resolving credentials and the project id.
    ///
    /// # Errors
    /// Returns an error if the credentials cannot be loaded or no project id can be determined.
    pub async fn from_config(config: &FcmConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;

        let credentials = match &config.credentials_file {
            Some(path) => TokenProvider::from_service_account_file(http.clone(), path)?,
            None => TokenProvider::from_metadata_server(http.clone(), &config.metadata_host),
        };

        let project_id = match (&config.project_id, credentials.project_id()) {
            (Some(id), _) => id.clone(),
            (None, Some(id)) => id.to_string(),
            (None, None) => credentials.discover_project_id().await.map_err(|e| {
                anyhow::anyhow!("No FCM project id configured and discovery failed (set GOOGLE_CLOUD_PROJECT): {e}")
            })?,
        };

        tracing::info!(project_id = %project_id, "FCM gateway configured");
        Ok(Self::new(http, &config.base_url, &project_id, credentials, config.multicast_concurrency))
    }

    #[must_use]
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        project_id: &str,
        credentials: TokenProvider,
        multicast_concurrency: usize,
    ) -> Self {
        let send_url = format!("{}/v1/projects/{project_id}/messages:send", base_url.trim_end_matches('/'));
        Self { http, send_url, credentials, multicast_concurrency: multicast_concurrency.max(1) }
    }

    async fn send(&self, target: Target<'_>, notification: &Notification) -> Result<String, PushError> {
        let access_token = self.credentials.access_token().await?;

        let (token, topic) = match target {
            Target::Token(token) => (Some(token), None),
            Target::Topic(topic) => (None, Some(topic)),
        };
        let request = SendRequest {
            message: Message {
                token,
                topic,
                notification: NotificationBody { title: &notification.title, body: &notification.body },
                data: &notification.data,
            },
        };

        let response = self
            .http
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| PushError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let result: SendResult = response
                .json()
                .await
                .map_err(|e| PushError::Other(anyhow::anyhow!("Unreadable FCM response: {e}")))?;
            return Ok(result.name);
        }

        if status == StatusCode::UNAUTHORIZED {
            self.credentials.invalidate().await;
        }

        let body = response.bytes().await.unwrap_or_default();
        Err(classify_error(status, &body))
    }

    /// Sends to one token of a multicast and keeps the token alongside its result.
    fn send_report<'a>(
        &'a self,
        token: String,
        notification: &'a Notification,
    ) -> impl Future<Output = SendResponse> + Send + 'a {
        async move {
            let result = self.send(Target::Token(&token), notification).await;
            if let Err(e) = &result {
                tracing::debug!(token = %fingerprint(&token), error = %e, "Multicast send failed for token");
            }
            SendResponse { token, result }
        }
    }
}

/// Maps an FCM error response onto the retry classification.
fn classify_error(status: StatusCode, body: &[u8]) -> PushError {
    let parsed = serde_json::from_slice::<ErrorEnvelope>(body).ok().map(|e| e.error);
    let message = parsed.as_ref().map_or_else(|| status.to_string(), |e| e.message.clone());

    let code = parsed.as_ref().and_then(|e| {
        e.details
            .iter()
            .find(|d| d.type_url == FCM_ERROR_TYPE)
            .and_then(|d| d.error_code.clone())
            .or_else(|| Some(e.status.clone()).filter(|s| !s.is_empty()))
    });

    match code.as_deref() {
        Some("UNREGISTERED") => PushError::Unregistered,
        Some("INVALID_ARGUMENT") => PushError::InvalidArgument(message),
        Some("SENDER_ID_MISMATCH" | "THIRD_PARTY_AUTH_ERROR" | "PERMISSION_DENIED") => PushError::Rejected(message),
        Some("QUOTA_EXCEEDED" | "RESOURCE_EXHAUSTED") => PushError::QuotaExceeded,
        Some("UNAVAILABLE" | "INTERNAL") => PushError::Unavailable(message),
        _ => match status {
            StatusCode::TOO_MANY_REQUESTS => PushError::QuotaExceeded,
            StatusCode::UNAUTHORIZED => PushError::Auth(message),
            s if s.is_server_error() => PushError::Unavailable(message),
            s if s.is_client_error() => PushError::Rejected(message),
            s => PushError::Other(anyhow::anyhow!("Unexpected FCM status {s}: {message}")),
        },
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    #[tracing::instrument(level = "debug", skip_all, fields(token = %fingerprint(token)))]
    async fn send_to_token(&self, token: &str, notification: &Notification) -> Result<String, PushError> {
        self.send(Target::Token(token), notification).await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(topic = %topic))]
    async fn send_to_topic(&self, topic: &str, notification: &Notification) -> Result<String, PushError> {
        self.send(Target::Topic(topic), notification).await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(count = tokens.len()))]
    async fn send_multicast(
        &self,
        tokens: &[String],
        notification: &Notification,
    ) -> Result<MulticastReport, PushError> {
        // A credential failure affects every token, so surface it before fanning out.
        self.credentials.access_token().await?;

        let responses = futures::stream::iter(tokens.iter().cloned())
            .map(|token| self.send_report(token, notification))
            .buffered(self.multicast_concurrency)
            .collect::<Vec<_>>()
            .await;

        Ok(MulticastReport { responses })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn fcm_error(status: &str, code: &str) -> Vec<u8> {
        body(json!({
            "error": {
                "code": 400,
                "message": "details here",
                "status": status,
                "details": [{ "@type": FCM_ERROR_TYPE, "errorCode": code }]
            }
        }))
    }

    #[test]
    fn test_classifies_fcm_error_codes() {
        let res = classify_error(StatusCode::NOT_FOUND, &fcm_error("NOT_FOUND", "UNREGISTERED"));
        assert!(matches!(res, PushError::Unregistered));

        let res = classify_error(StatusCode::BAD_REQUEST, &fcm_error("INVALID_ARGUMENT", "INVALID_ARGUMENT"));
        assert!(matches!(res, PushError::InvalidArgument(ref m) if m == "details here"));

        let res = classify_error(StatusCode::FORBIDDEN, &fcm_error("PERMISSION_DENIED", "SENDER_ID_MISMATCH"));
        assert!(matches!(res, PushError::Rejected(_)));

        let res = classify_error(StatusCode::TOO_MANY_REQUESTS, &fcm_error("RESOURCE_EXHAUSTED", "QUOTA_EXCEEDED"));
        assert!(matches!(res, PushError::QuotaExceeded));

        let res = classify_error(StatusCode::SERVICE_UNAVAILABLE, &fcm_error("UNAVAILABLE", "UNAVAILABLE"));
        assert!(res.is_retryable());

        let res = classify_error(StatusCode::INTERNAL_SERVER_ERROR, &fcm_error("INTERNAL", "INTERNAL"));
        assert!(matches!(res, PushError::Unavailable(_)));
    }

    #[test]
    fn test_falls_back_to_google_status() {
        let res = classify_error(
            StatusCode::BAD_REQUEST,
            &body(json!({ "error": { "code": 400, "message": "bad topic", "status": "INVALID_ARGUMENT" } })),
        );
        assert!(matches!(res, PushError::InvalidArgument(ref m) if m == "bad topic"));
    }

    #[test]
    fn test_falls_back_to_http_status() {
        assert!(matches!(classify_error(StatusCode::BAD_GATEWAY, b"<html>"), PushError::Unavailable(_)));
        assert!(matches!(classify_error(StatusCode::TOO_MANY_REQUESTS, b""), PushError::QuotaExceeded));
        assert!(matches!(classify_error(StatusCode::UNAUTHORIZED, b""), PushError::Auth(_)));

        let res = classify_error(StatusCode::NOT_FOUND, b"");
        assert!(matches!(res, PushError::Rejected(_)));
        assert!(!res.is_retryable());
    }

    #[test]
    fn test_request_body_shape() {
        let data = HashMap::from([("order_id".to_string(), "42".to_string())]);
        let request = SendRequest {
            message: Message {
                token: Some("device-1"),
                topic: None,
                notification: NotificationBody { title: "Hello", body: "World" },
                data: &data,
            },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "message": {
                    "token": "device-1",
                    "notification": { "title": "Hello", "body": "World" },
                    "data": { "order_id": "42" }
                }
            })
        );

        let empty = HashMap::new();
        let request = SendRequest {
            message: Message {
                token: None,
                topic: Some("news"),
                notification: NotificationBody { title: "a", body: "b" },
                data: &empty,
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["message"]["topic"], "news");
        assert!(value["message"].get("data").is_none());
        assert!(value["message"].get("token").is_none());
    }

    #[test]
    fn test_send_url() {
        let gateway = FcmGateway::new(
            reqwest::Client::new(),
            "https://fcm.googleapis.com/",
            "demo-project",
            TokenProvider::from_metadata_server(reqwest::Client::new(), "127.0.0.1:1"),
            0,
        );
        assert_eq!(gateway.send_url, "https://fcm.googleapis.com/v1/projects/demo-project/messages:send");
        assert_eq!(gateway.multicast_concurrency, 1);
    }
}
