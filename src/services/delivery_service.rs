use crate::adapters::push::{MulticastReport, PushError, PushGateway};
use crate::domain::notification::{
    BroadcastPayload, Delivery, DeliveryTarget, DevicePayload, MAX_MULTICAST_TOKENS, Notification, PayloadError,
    TopicPayload,
};
use crate::domain::token::fingerprint;
use crate::error::{AppError, Result};
use crate::services::envelope;
use crate::services::token_service::TokenService;
use crate::telemetry::SERVICE;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;

#[derive(Clone, Debug)]
struct Metrics {
    deliveries_total: Counter<u64>,
    gateway_errors_total: Counter<u64>,
    multicast_tokens_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter(SERVICE);
        Self {
            deliveries_total: meter
                .u64_counter("relay_deliveries_total")
                .with_description("Push deliveries handled, by addressing mode and outcome")
                .build(),
            gateway_errors_total: meter
                .u64_counter("relay_gateway_errors_total")
                .with_description("Errors returned by the push gateway")
                .build(),
            multicast_tokens_total: meter
                .u64_counter("relay_multicast_tokens_total")
                .with_description("Per-token results of multicast sends")
                .build(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Device,
    Topic,
    Broadcast,
}

impl DeliveryMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Topic => "topic",
            Self::Broadcast => "broadcast",
        }
    }

    fn parse(self, payload: &[u8]) -> std::result::Result<Delivery, PayloadError> {
        match self {
            Self::Device => serde_json::from_slice::<DevicePayload>(payload)?.into_delivery(),
            Self::Topic => serde_json::from_slice::<TopicPayload>(payload)?.into_delivery(),
            Self::Broadcast => serde_json::from_slice::<BroadcastPayload>(payload)?.into_delivery(),
        }
    }
}

/// How a queue delivery ended. Each variant maps to one status of the push-subscription contract.
#[derive(Debug)]
pub enum DeliveryOutcome {
    Sent { message_id: String },
    Multicast { success_count: usize, failure_count: usize },
    /// Fan-out found nobody to send to.
    NoRecipients,
    /// Acked without sending; redelivery cannot make this message succeed.
    Dropped { reason: &'static str },
    /// The gateway failed transiently; the queue should redeliver.
    Retry { error: PushError },
}

impl DeliveryOutcome {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Sent { .. } | Self::Multicast { .. } => "processed",
            Self::NoRecipients => "no_recipients",
            Self::Dropped { .. } => "dropped",
            Self::Retry { .. } => "retry",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DeliveryService {
    gateway: Arc<dyn PushGateway>,
    tokens: TokenService,
    metrics: Metrics,
}

impl DeliveryService {
    #[must_use]
    pub fn new(gateway: Arc<dyn PushGateway>, tokens: TokenService) -> Self {
        Self { gateway, tokens, metrics: Metrics::new() }
    }

    /// Handles one push request body end to end.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` when an explicit token list is empty, too long, or has blank entries.
    #[tracing::instrument(
        skip_all,
        fields(mode = mode.as_str(), message_id = tracing::field::Empty, subscription = tracing::field::Empty)
    )]
    pub async fn deliver(&self, mode: DeliveryMode, body: &[u8]) -> Result<DeliveryOutcome> {
        let message = match envelope::decode(body) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Unprocessable push envelope, acking");
                return Ok(self.finish(mode, DeliveryOutcome::Dropped { reason: e.reason() }));
            }
        };

        let span = tracing::Span::current();
        span.record("message_id", message.message_id.as_str());
        span.record("subscription", message.subscription.as_str());
        tracing::debug!(publish_time = ?message.publish_time, "Received push message");

        let delivery = match mode.parse(&message.payload) {
            Ok(delivery) => delivery,
            Err(e) if e.is_client_error() => {
                tracing::warn!(error = %e, "Rejecting token list");
                self.record(mode, "rejected");
                return Err(AppError::BadRequest(e.to_string()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Invalid business payload, acking");
                return Ok(self.finish(mode, DeliveryOutcome::Dropped { reason: "invalid_payload" }));
            }
        };

        let outcome = self.dispatch(delivery).await;
        Ok(self.finish(mode, outcome))
    }

    /// Acks a delivery whose body could not be read, such as one over the size limit.
    pub fn drop_unreadable(&self, mode: DeliveryMode, error: &dyn std::fmt::Display) -> DeliveryOutcome {
        tracing::warn!(mode = mode.as_str(), error = %error, "Unreadable push body, acking");
        self.finish(mode, DeliveryOutcome::Dropped { reason: "unreadable_body" })
    }

    async fn dispatch(&self, delivery: Delivery) -> DeliveryOutcome {
        let Delivery { notification, target } = delivery;

        match target {
            DeliveryTarget::Token(token) => {
                tracing::info!(token = %fingerprint(&token), title = %notification.title, "Sending to device");
                match self.gateway.send_to_token(&token, &notification).await {
                    Ok(message_id) => DeliveryOutcome::Sent { message_id },
                    Err(e) => self.gateway_failure(e),
                }
            }
            DeliveryTarget::Topic(topic) => {
                tracing::info!(topic = %topic, title = %notification.title, "Sending to topic");
                match self.gateway.send_to_topic(&topic, &notification).await {
                    Ok(message_id) => DeliveryOutcome::Sent { message_id },
                    Err(e) => self.gateway_failure(e),
                }
            }
            DeliveryTarget::Tokens(tokens) => self.multicast(&tokens, &notification).await,
            DeliveryTarget::Registry => {
                let tokens = self.tokens.snapshot();
                if tokens.is_empty() {
                    tracing::info!("No registered devices to notify");
                    return DeliveryOutcome::NoRecipients;
                }
                self.multicast(&tokens, &notification).await
            }
        }
    }

    /// Sends to `tokens` in gateway-sized batches. A wholesale failure of any batch decides the outcome.
    async fn multicast(&self, tokens: &[String], notification: &Notification) -> DeliveryOutcome {
        tracing::info!(count = tokens.len(), title = %notification.title, "Sending multicast");

        let mut report = MulticastReport::default();
        for batch in tokens.chunks(MAX_MULTICAST_TOKENS) {
            match self.gateway.send_multicast(batch, notification).await {
                Ok(batch_report) => report.merge(batch_report),
                Err(e) => return self.gateway_failure(e),
            }
        }

        for token in report.unregistered_tokens() {
            self.tokens.forget(token);
        }

        let success_count = report.success_count();
        let failure_count = report.failure_count();
        self.metrics.multicast_tokens_total.add(success_count as u64, &[KeyValue::new("result", "success")]);
        self.metrics.multicast_tokens_total.add(failure_count as u64, &[KeyValue::new("result", "failure")]);
        if failure_count > 0 {
            tracing::warn!(success_count, failure_count, "Multicast completed with failures");
        }

        DeliveryOutcome::Multicast { success_count, failure_count }
    }

    fn gateway_failure(&self, error: PushError) -> DeliveryOutcome {
        self.metrics.gateway_errors_total.add(1, &[KeyValue::new("reason", error.reason())]);

        if error.is_retryable() {
            tracing::error!(error = %error, "Push gateway failed, requesting redelivery");
            DeliveryOutcome::Retry { error }
        } else {
            tracing::warn!(error = %error, "Push gateway rejected message, acking");
            DeliveryOutcome::Dropped { reason: error.reason() }
        }
    }

    fn finish(&self, mode: DeliveryMode, outcome: DeliveryOutcome) -> DeliveryOutcome {
        self.record(mode, outcome.label());
        outcome
    }

    fn record(&self, mode: DeliveryMode, outcome: &'static str) {
        self.metrics.deliveries_total.add(1, &[KeyValue::new("mode", mode.as_str()), KeyValue::new("outcome", outcome)]);
    }
}
