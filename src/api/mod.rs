use crate::api::rate_limit::log_rate_limit_events;
use crate::config::Config;
use crate::services::delivery_service::DeliveryService;
use crate::services::rate_limit_service::RateLimitService;
use crate::services::token_service::TokenService;
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, Request, StatusCode};
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub mod health;
pub mod push;
pub mod rate_limit;
pub mod registration;
pub mod schemas;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Debug)]
pub struct AppState {
    pub delivery_service: DeliveryService,
    pub token_service: TokenService,
    pub rate_limit_service: RateLimitService,
}

#[derive(Debug)]
pub struct ServiceContainer {
    pub delivery_service: DeliveryService,
    pub token_service: TokenService,
    pub rate_limit_service: RateLimitService,
}

/// Configures and returns the relay router.
///
/// # Errors
/// Returns an error if the rate limiter configuration cannot be constructed.
pub fn app_router(config: &Config, services: ServiceContainer) -> anyhow::Result<Router> {
    let interval_ns = 1_000_000_000 / config.rate_limit.register_per_second.max(1);
    let register_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_nanosecond(u64::from(interval_ns))
            .burst_size(config.rate_limit.register_burst.max(1))
            .key_extractor(services.rate_limit_service.extractor.clone())
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build registration rate limiter config"))?,
    );

    let state = AppState {
        delivery_service: services.delivery_service,
        token_service: services.token_service,
        rate_limit_service: services.rate_limit_service,
    };

    // Only registration is client facing; push routes are called by the queue.
    let register_routes = Router::new()
        .route("/register", post(registration::register))
        .layer(DefaultBodyLimit::max(config.server.max_body_bytes))
        .layer(GovernorLayer::new(register_conf))
        .layer(from_fn_with_state(state.clone(), log_rate_limit_events));

    let push_routes = Router::new()
        .route("/pubsub/push/device", post(push::push_device))
        .route("/push/device", post(push::push_device))
        .route("/pubsub/push/topic", post(push::push_topic))
        .route("/pubsub/push/broadcast", post(push::push_broadcast))
        .layer(DefaultBodyLimit::max(config.server.max_push_body_bytes));

    let request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);

    Ok(Router::new()
        .route("/health", get(health::health))
        .merge(register_routes)
        .merge(push_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::SERVICE_UNAVAILABLE,
            Duration::from_secs(config.server.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<RequestId>()
                        .and_then(|id| id.header_value().to_str().ok())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                    )
                })
                .on_response(|response: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                    let status = response.status();
                    span.record("http.response.status_code", status.as_u16());

                    tracing::info!(
                        latency_ms = %latency.as_millis(),
                        status = %status.as_u16(),
                        "request completed"
                    );
                })
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state))
}
