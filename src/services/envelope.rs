use crate::domain::envelope::{DecodedMessage, PushEnvelope};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed push envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("push envelope carries no data")]
    EmptyPayload,
    #[error("message data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl EnvelopeError {
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed_envelope",
            Self::EmptyPayload => "empty_payload",
            Self::Base64(_) => "invalid_base64",
        }
    }
}

/// Unwraps a Pub/Sub push request body into the inner payload bytes.
///
/// # Errors
/// Returns `EnvelopeError` if the body is not an envelope, carries no data, or the data is not base64.
pub fn decode(body: &[u8]) -> Result<DecodedMessage, EnvelopeError> {
    let envelope: PushEnvelope = serde_json::from_slice(body)?;
    let message = envelope.message;

    if message.data.is_empty() {
        return Err(EnvelopeError::EmptyPayload);
    }
    let payload = STANDARD.decode(message.data.as_bytes())?;

    Ok(DecodedMessage {
        message_id: message.message_id,
        subscription: envelope.subscription,
        publish_time: message.publish_time,
        attributes: message.attributes,
        payload,
    })
}
