use serde::Deserialize;
use std::collections::HashMap;
use time::OffsetDateTime;

/// The wrapper a Pub/Sub push subscription posts to its endpoint.
#[derive(Debug, Deserialize)]
pub struct PushEnvelope {
    #[serde(default)]
    pub subscription: String,
    pub message: PubSubMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubSubMessage {
    /// Base64 encoded business payload.
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub publish_time: Option<OffsetDateTime>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// An envelope after unwrapping, carrying the raw inner payload bytes.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    pub message_id: String,
    pub subscription: String,
    pub publish_time: Option<OffsetDateTime>,
    pub attributes: HashMap<String, String>,
    pub payload: Vec<u8>,
}
