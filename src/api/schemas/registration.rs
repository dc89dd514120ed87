use crate::domain::token::MAX_TOKEN_LENGTH;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct RegisterPushTokenRequest {
    pub token: String,
}

impl RegisterPushTokenRequest {
    /// Validates the token registration payload and returns the trimmed token.
    ///
    /// # Errors
    /// Returns an error if the token is empty or excessively large (anti-abuse).
    pub fn validate(&self) -> Result<&str, String> {
        let trimmed = self.token.trim();
        if trimmed.is_empty() {
            return Err("Token cannot be empty".into());
        }
        if trimmed.chars().count() > MAX_TOKEN_LENGTH {
            return Err(format!("Token is too long (max {MAX_TOKEN_LENGTH} characters)"));
        }
        Ok(trimmed)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_token_success() {
        let req = RegisterPushTokenRequest { token: "  valid_fcm_token_123 ".into() };
        assert_eq!(req.validate().unwrap(), "valid_fcm_token_123");
    }

    #[test]
    fn test_validate_token_empty() {
        let req = RegisterPushTokenRequest { token: "   ".into() };
        assert_eq!(req.validate().unwrap_err(), "Token cannot be empty");
    }

    #[test]
    fn test_validate_token_length_boundary() {
        let req = RegisterPushTokenRequest { token: "A".repeat(4096) };
        assert!(req.validate().is_ok());

        let req = RegisterPushTokenRequest { token: "A".repeat(4097) };
        assert_eq!(req.validate().unwrap_err(), "Token is too long (max 4096 characters)");
    }

    #[test]
    fn test_length_counts_characters() {
        let req = RegisterPushTokenRequest { token: "é".repeat(4096) };
        assert!(req.validate().is_ok());
    }
}
