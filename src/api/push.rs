use crate::api::AppState;
use crate::error::Result;
use crate::services::delivery_service::{DeliveryMode, DeliveryOutcome};
use axum::{body::Bytes, extract::State, extract::rejection::BytesRejection};

// Bodies are taken raw: an undecodable or oversized delivery must still be acked with 204, never rejected by an extractor.
type PushBody = std::result::Result<Bytes, BytesRejection>;

async fn deliver(state: &AppState, mode: DeliveryMode, body: PushBody) -> Result<DeliveryOutcome> {
    match body {
        Ok(body) => state.delivery_service.deliver(mode, &body).await,
        Err(rejection) => Ok(state.delivery_service.drop_unreadable(mode, &rejection)),
    }
}

/// Delivers a Pub/Sub message to one device token or an explicit token list.
///
/// # Errors
/// Returns `AppError::BadRequest` if an explicit token list is empty or exceeds the multicast limit.
pub async fn push_device(State(state): State<AppState>, body: PushBody) -> Result<DeliveryOutcome> {
    deliver(&state, DeliveryMode::Device, body).await
}

/// Delivers a Pub/Sub message to an FCM topic.
///
/// # Errors
/// Never fails; every outcome maps to a status.
pub async fn push_topic(State(state): State<AppState>, body: PushBody) -> Result<DeliveryOutcome> {
    deliver(&state, DeliveryMode::Topic, body).await
}

/// Fans a Pub/Sub message out to every registered device.
///
/// # Errors
/// Returns `AppError::BadRequest` if an explicit token list is out of bounds.
pub async fn push_broadcast(State(state): State<AppState>, body: PushBody) -> Result<DeliveryOutcome> {
    deliver(&state, DeliveryMode::Broadcast, body).await
}
