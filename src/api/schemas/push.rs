use crate::error::AppError;
use crate::services::delivery_service::DeliveryOutcome;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct SentResponse {
    pub status: String,
    pub message_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MulticastResponse {
    pub status: String,
    pub success_count: usize,
    pub failure_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcknowledgedResponse {
    pub status: String,
    pub reason: String,
}

impl IntoResponse for DeliveryOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::Sent { message_id } => {
                Json(SentResponse { status: "processed".into(), message_id }).into_response()
            }
            Self::Multicast { success_count, failure_count } => {
                Json(MulticastResponse { status: "processed".into(), success_count, failure_count }).into_response()
            }
            Self::NoRecipients => Json(AcknowledgedResponse {
                status: "acknowledged".into(),
                reason: "no registered devices".into(),
            })
            .into_response(),
            Self::Dropped { reason } => {
                tracing::debug!(reason, "Acking message without delivery");
                StatusCode::NO_CONTENT.into_response()
            }
            Self::Retry { error } => {
                tracing::debug!(reason = error.reason(), "Asking the queue to redeliver");
                AppError::Unavailable("Failed to send notification".into()).into_response()
            }
        }
    }
}
