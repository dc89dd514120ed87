use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// FCM accepts at most this many tokens in one multicast.
pub const MAX_MULTICAST_TOKENS: usize = 500;

/// What the gateway renders on the device, plus the opaque data map handed to the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryTarget {
    Token(String),
    Tokens(Vec<String>),
    Topic(String),
    /// Every token currently held by the registry.
    Registry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub notification: Notification,
    pub target: DeliveryTarget,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("{0} is required in payload")]
    MissingField(&'static str),
    #[error("tokens must contain between 1 and {max} entries, got {0}", max = MAX_MULTICAST_TOKENS)]
    TokenCount(usize),
    #[error("tokens[{0}] is empty")]
    BlankToken(usize),
}

impl PayloadError {
    /// Token list violations are reported back to the caller; everything else is acked and dropped.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::TokenCount(_) | Self::BlankToken(_))
    }
}

/// Payload for `/pubsub/push/device`. `tokens` switches the request to a multicast.
#[derive(Debug, Deserialize)]
pub struct DevicePayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub tokens: Option<Vec<String>>,
    #[serde(default)]
    pub custom_data: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
pub struct TopicPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub custom_data: Option<HashMap<String, String>>,
}

/// Payload for the registry fan-out. Without `tokens` every registered device is targeted.
#[derive(Debug, Deserialize)]
pub struct BroadcastPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tokens: Option<Vec<String>>,
    #[serde(default)]
    pub custom_data: Option<HashMap<String, String>>,
}

fn notification(
    title: String,
    body: String,
    custom_data: Option<HashMap<String, String>>,
) -> Result<Notification, PayloadError> {
    if title.trim().is_empty() {
        return Err(PayloadError::MissingField("title"));
    }
    if body.trim().is_empty() {
        return Err(PayloadError::MissingField("body"));
    }
    Ok(Notification { title, body, data: custom_data.unwrap_or_default() })
}

fn check_tokens(tokens: &[String]) -> Result<(), PayloadError> {
    if tokens.is_empty() || tokens.len() > MAX_MULTICAST_TOKENS {
        return Err(PayloadError::TokenCount(tokens.len()));
    }
    if let Some(index) = tokens.iter().position(|t| t.trim().is_empty()) {
        return Err(PayloadError::BlankToken(index));
    }
    Ok(())
}

impl DevicePayload {
    /// Validates the payload and resolves its addressing mode.
    ///
    /// # Errors
    /// Returns `PayloadError` if a required field is missing or the token list is out of bounds.
    pub fn into_delivery(self) -> Result<Delivery, PayloadError> {
        let notification = notification(self.title, self.body, self.custom_data)?;

        let target = if let Some(tokens) = self.tokens {
            check_tokens(&tokens)?;
            DeliveryTarget::Tokens(tokens)
        } else {
            match self.token {
                Some(token) if !token.trim().is_empty() => DeliveryTarget::Token(token),
                _ => return Err(PayloadError::MissingField("token")),
            }
        };

        Ok(Delivery { notification, target })
    }
}

impl TopicPayload {
    /// # Errors
    /// Returns `PayloadError::MissingField` if title, body or topic is empty.
    pub fn into_delivery(self) -> Result<Delivery, PayloadError> {
        let notification = notification(self.title, self.body, self.custom_data)?;
        if self.topic.trim().is_empty() {
            return Err(PayloadError::MissingField("topic"));
        }
        Ok(Delivery { notification, target: DeliveryTarget::Topic(self.topic) })
    }
}

impl BroadcastPayload {
    /// # Errors
    /// Returns `PayloadError` if title or body is empty, or an explicit token list is out of bounds.
    pub fn into_delivery(self) -> Result<Delivery, PayloadError> {
        let notification = notification(self.title, self.body, self.custom_data)?;
        let target = match self.tokens {
            Some(tokens) => {
                check_tokens(&tokens)?;
                DeliveryTarget::Tokens(tokens)
            }
            None => DeliveryTarget::Registry,
        };
        Ok(Delivery { notification, target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn device(value: serde_json::Value) -> Result<Delivery, PayloadError> {
        serde_json::from_value::<DevicePayload>(value).unwrap().into_delivery()
    }

    #[test]
    fn test_device_single_token() {
        let delivery = device(json!({
            "title": "Hello",
            "body": "World",
            "token": "tok-1",
            "custom_data": { "order_id": "42" }
        }))
        .unwrap();

        assert_eq!(delivery.target, DeliveryTarget::Token("tok-1".into()));
        assert_eq!(delivery.notification.title, "Hello");
        assert_eq!(delivery.notification.data.get("order_id").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_device_missing_fields() {
        let res = device(json!({ "body": "World", "token": "t" }));
        assert!(matches!(res, Err(PayloadError::MissingField("title"))));

        let res = device(json!({ "title": "Hello", "body": "  ", "token": "t" }));
        assert!(matches!(res, Err(PayloadError::MissingField("body"))));

        let res = device(json!({ "title": "Hello", "body": "World", "token": "" }));
        assert!(matches!(res, Err(PayloadError::MissingField("token"))));

        let res = device(json!({ "title": "Hello", "body": "World" }));
        let err = res.unwrap_err();
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_device_tokens_take_precedence() {
        let delivery = device(json!({
            "title": "Hello",
            "body": "World",
            "token": "ignored",
            "tokens": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(delivery.target, DeliveryTarget::Tokens(vec!["a".into(), "b".into()]));
        assert!(delivery.notification.data.is_empty());
    }

    #[test]
    fn test_empty_tokens_list_is_not_replaced_by_token() {
        let err = device(json!({ "title": "a", "body": "b", "token": "valid", "tokens": [] })).unwrap_err();
        assert!(matches!(err, PayloadError::TokenCount(0)));
        assert!(err.is_client_error());

        let delivery = device(json!({ "title": "a", "body": "b", "token": "valid", "tokens": null })).unwrap();
        assert_eq!(delivery.target, DeliveryTarget::Token("valid".into()));
    }

    #[test]
    fn test_token_count_bounds() {
        let at_limit: Vec<String> = (0..MAX_MULTICAST_TOKENS).map(|i| format!("t{i}")).collect();
        assert!(device(json!({ "title": "a", "body": "b", "tokens": at_limit })).is_ok());

        let over: Vec<String> = (0..=MAX_MULTICAST_TOKENS).map(|i| format!("t{i}")).collect();
        let err = device(json!({ "title": "a", "body": "b", "tokens": over })).unwrap_err();
        assert!(matches!(err, PayloadError::TokenCount(501)));
        assert!(err.is_client_error());

        let err = device(json!({ "title": "a", "body": "b", "tokens": [] })).unwrap_err();
        assert!(matches!(err, PayloadError::TokenCount(0)));

        let err = device(json!({ "title": "a", "body": "b", "tokens": ["x", " "] })).unwrap_err();
        assert!(matches!(err, PayloadError::BlankToken(1)));
    }

    #[test]
    fn test_topic_payload() {
        let delivery = serde_json::from_value::<TopicPayload>(json!({
            "title": "News",
            "body": "Breaking",
            "topic": "sports"
        }))
        .unwrap()
        .into_delivery()
        .unwrap();
        assert_eq!(delivery.target, DeliveryTarget::Topic("sports".into()));

        let err = serde_json::from_value::<TopicPayload>(json!({ "title": "News", "body": "Breaking" }))
            .unwrap()
            .into_delivery()
            .unwrap_err();
        assert!(matches!(err, PayloadError::MissingField("topic")));
    }

    #[test]
    fn test_broadcast_defaults_to_registry() {
        let delivery = serde_json::from_value::<BroadcastPayload>(json!({ "title": "a", "body": "b" }))
            .unwrap()
            .into_delivery()
            .unwrap();
        assert_eq!(delivery.target, DeliveryTarget::Registry);
    }

    #[test]
    fn test_custom_data_must_be_strings() {
        let res = serde_json::from_value::<DevicePayload>(json!({
            "title": "a",
            "body": "b",
            "token": "t",
            "custom_data": { "count": 3 }
        }));
        assert!(res.is_err());
    }
}
