use crate::domain::token::fingerprint;
use crate::storage::TokenRegistry;
use crate::telemetry::SERVICE;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, UpDownCounter},
};

#[derive(Clone, Debug)]
struct Metrics {
    registrations_total: Counter<u64>,
    registered_tokens: UpDownCounter<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter(SERVICE);
        Self {
            registrations_total: meter
                .u64_counter("relay_registrations_total")
                .with_description("Device token registration attempts by result")
                .build(),
            registered_tokens: meter
                .i64_up_down_counter("relay_registered_tokens")
                .with_description("Number of device tokens currently held in memory")
                .build(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    AlreadyExists,
}

/// Owns the device token registry on behalf of the HTTP handlers and the fan-out path.
#[derive(Clone, Debug)]
pub struct TokenService {
    registry: TokenRegistry,
    metrics: Metrics,
}

impl TokenService {
    #[must_use]
    pub fn new(registry: TokenRegistry) -> Self {
        Self { registry, metrics: Metrics::new() }
    }

    /// Registers an already validated token.
    #[tracing::instrument(skip_all, fields(token = %fingerprint(token)))]
    pub fn register(&self, token: &str) -> Registration {
        if self.registry.add(token) {
            self.metrics.registered_tokens.add(1, &[]);
            self.metrics.registrations_total.add(1, &[KeyValue::new("result", "created")]);
            tracing::info!(total = self.registry.len(), "Device token registered");
            Registration::Created
        } else {
            self.metrics.registrations_total.add(1, &[KeyValue::new("result", "exists")]);
            tracing::debug!("Device token already registered");
            Registration::AlreadyExists
        }
    }

    /// Forgets a token the gateway no longer accepts.
    pub fn forget(&self, token: &str) {
        if self.registry.remove(token) {
            self.metrics.registered_tokens.add(-1, &[]);
            tracing::info!(token = %fingerprint(token), "Removed unregistered device token");
        }
    }

    /// Every registered token, sorted so fan-out batches are deterministic.
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.registry.list().into_iter().collect();
        tokens.sort_unstable();
        tokens
    }

    #[must_use]
    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }
}
