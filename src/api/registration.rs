use crate::api::AppState;
use crate::api::schemas::registration::{MessageResponse, RegisterPushTokenRequest};
use crate::error::{AppError, Result};
use crate::services::token_service::Registration;
use axum::{Json, body::Bytes, extract::State, http::StatusCode, response::IntoResponse};

/// Registers a device token for broadcast delivery.
///
/// # Errors
/// Returns `AppError::BadRequest` if the body is not a token object or the token fails validation.
pub async fn register(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse> {
    let payload: RegisterPushTokenRequest =
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?;
    let token = payload.validate().map_err(AppError::BadRequest)?;

    let (status, message) = match state.token_service.register(token) {
        Registration::Created => (StatusCode::CREATED, "Device token registered successfully"),
        Registration::AlreadyExists => (StatusCode::CONFLICT, "Device token already exists"),
    };

    Ok((status, Json(MessageResponse { message: message.into() })))
}
