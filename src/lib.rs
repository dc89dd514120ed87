#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod storage;
pub mod telemetry;

use crate::adapters::push::PushGateway;
use crate::api::ServiceContainer;
use crate::config::Config;
use crate::services::delivery_service::DeliveryService;
use crate::services::rate_limit_service::RateLimitService;
use crate::services::token_service::TokenService;
use crate::storage::TokenRegistry;
use std::sync::Arc;
use tokio::sync::watch;

/// Wires the relay's components. The push gateway must be supplied; the registry defaults to empty.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    push_gateway: Option<Arc<dyn PushGateway>>,
    token_registry: Option<TokenRegistry>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, push_gateway: None, token_registry: None }
    }

    #[must_use]
    pub fn with_push_gateway(mut self, gateway: Arc<dyn PushGateway>) -> Self {
        self.push_gateway = Some(gateway);
        self
    }

    #[must_use]
    pub fn with_token_registry(mut self, registry: TokenRegistry) -> Self {
        self.token_registry = Some(registry);
        self
    }

    /// Builds the services and the router.
    ///
    /// # Errors
    /// Returns an error if no push gateway was supplied or the router cannot be configured.
    pub fn build(self) -> anyhow::Result<axum::Router> {
        let gateway = self.push_gateway.ok_or_else(|| anyhow::anyhow!("Push gateway is required"))?;
        let token_service = TokenService::new(self.token_registry.unwrap_or_default());

        let services = ServiceContainer {
            delivery_service: DeliveryService::new(gateway, token_service.clone()),
            token_service,
            rate_limit_service: RateLimitService::new(self.config.rate_limit.trusted_proxies.clone()),
        };

        api::app_router(&self.config, services)
    }
}

/// Routes panics through tracing so they reach the structured log pipeline.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!(panic.location = %location, panic.payload = %payload, "Process panicked");
    }));
}

/// Flips `shutdown_tx` to `true` on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received, draining in-flight requests");
        let _ = shutdown_tx.send(true);
    });
}
