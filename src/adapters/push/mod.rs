use crate::domain::notification::Notification;
use async_trait::async_trait;
use thiserror::Error;

pub mod auth;
pub mod fcm;
pub mod mock;

pub use fcm::FcmGateway;
pub use mock::MockPushGateway;

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Token is no longer registered")]
    Unregistered,
    #[error("Invalid message: {0}")]
    InvalidArgument(String),
    #[error("Rejected by push service: {0}")]
    Rejected(String),
    #[error("Rate limit exceeded")]
    QuotaExceeded,
    #[error("Push service unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to obtain push service credentials: {0}")]
    Auth(String),
    #[error("External service error: {0}")]
    Other(#[from] anyhow::Error),
}

impl PushError {
    /// Whether redelivering the same message could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Unregistered | Self::InvalidArgument(_) | Self::Rejected(_) => false,
            Self::QuotaExceeded | Self::Unavailable(_) | Self::Auth(_) | Self::Other(_) => true,
        }
    }

    /// Low-cardinality label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Rejected(_) => "rejected",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Unavailable(_) => "unavailable",
            Self::Auth(_) => "auth",
            Self::Other(_) => "other",
        }
    }
}

/// Outcome of sending to one token as part of a multicast.
#[derive(Debug)]
pub struct SendResponse {
    pub token: String,
    pub result: Result<String, PushError>,
}

/// Per-token results of a multicast, in the order the tokens were given.
#[derive(Debug, Default)]
pub struct MulticastReport {
    pub responses: Vec<SendResponse>,
}

impl MulticastReport {
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.responses.iter().filter(|r| r.result.is_ok()).count()
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.responses.len() - self.success_count()
    }

    /// Tokens the gateway reported as no longer registered.
    pub fn unregistered_tokens(&self) -> impl Iterator<Item = &str> {
        self.responses
            .iter()
            .filter(|r| matches!(r.result, Err(PushError::Unregistered)))
            .map(|r| r.token.as_str())
    }

    pub fn merge(&mut self, other: Self) {
        self.responses.extend(other.responses);
    }
}

/// Capability interface over the external push gateway.
#[async_trait]
pub trait PushGateway: Send + Sync + std::fmt::Debug {
    /// Sends a notification to a single device token and returns the provider message id.
    ///
    /// # Errors
    /// Returns `PushError::Unregistered` if the token is invalid and should be forgotten.
    async fn send_to_token(&self, token: &str, notification: &Notification) -> Result<String, PushError>;

    /// Sends a notification to every subscriber of `topic`.
    ///
    /// # Errors
    /// Returns a classified `PushError` if the gateway refuses or cannot be reached.
    async fn send_to_topic(&self, topic: &str, notification: &Notification) -> Result<String, PushError>;

    /// Sends the same notification to up to 500 tokens.
    ///
    /// Per-token failures are reported in the `MulticastReport`. An `Err` means the batch as a
    /// whole could not be attempted.
    ///
    /// # Errors
    /// Returns a classified `PushError` for failures that affect the entire batch.
    async fn send_multicast(&self, tokens: &[String], notification: &Notification)
    -> Result<MulticastReport, PushError>;
}
