use crate::adapters::push::{MulticastReport, PushError, PushGateway, SendResponse};
use crate::domain::notification::Notification;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Failure injected into every call of a `MockPushGateway`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Behaves like an FCM outage.
    Retryable,
    /// Behaves like a message FCM refuses outright.
    NonRetryable,
}

impl MockFailure {
    fn to_error(self) -> PushError {
        match self {
            Self::Retryable => PushError::Unavailable("mock outage".into()),
            Self::NonRetryable => PushError::InvalidArgument("mock rejection".into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentTarget {
    Token(String),
    Topic(String),
    Multicast(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub target: SentTarget,
    pub notification: Notification,
}

/// In-process gateway that records every call and answers with scripted results.
#[derive(Debug, Default)]
pub struct MockPushGateway {
    calls: Mutex<Vec<SentMessage>>,
    failure: Mutex<Option<MockFailure>>,
    unregistered: Mutex<HashSet<String>>,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockPushGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail. `None` restores success.
    pub fn set_failure(&self, failure: Option<MockFailure>) {
        *lock(&self.failure) = failure;
    }

    /// Makes sends to `token` fail with `PushError::Unregistered`.
    pub fn mark_unregistered(&self, token: &str) {
        lock(&self.unregistered).insert(token.to_owned());
    }

    #[must_use]
    pub fn calls(&self) -> Vec<SentMessage> {
        lock(&self.calls).clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    fn record(&self, target: SentTarget, notification: &Notification) -> Result<(), PushError> {
        lock(&self.calls).push(SentMessage { target, notification: notification.clone() });
        lock(&self.failure).map_or(Ok(()), |f| Err(f.to_error()))
    }

    fn deliver(&self, token: &str) -> Result<String, PushError> {
        if lock(&self.unregistered).contains(token) {
            return Err(PushError::Unregistered);
        }
        Ok(self.message_id())
    }

    fn message_id(&self) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        format!("projects/mock/messages/{id}")
    }
}

#[async_trait]
impl PushGateway for MockPushGateway {
    async fn send_to_token(&self, token: &str, notification: &Notification) -> Result<String, PushError> {
        self.record(SentTarget::Token(token.to_owned()), notification)?;
        self.deliver(token)
    }

    async fn send_to_topic(&self, topic: &str, notification: &Notification) -> Result<String, PushError> {
        self.record(SentTarget::Topic(topic.to_owned()), notification)?;
        Ok(self.message_id())
    }

    async fn send_multicast(
        &self,
        tokens: &[String],
        notification: &Notification,
    ) -> Result<MulticastReport, PushError> {
        self.record(SentTarget::Multicast(tokens.to_vec()), notification)?;
        let responses =
            tokens.iter().map(|token| SendResponse { token: token.clone(), result: self.deliver(token) }).collect();
        Ok(MulticastReport { responses })
    }
}
