use sha2::{Digest, Sha256};

/// Longest device token accepted for registration, counted in characters after trimming.
pub const MAX_TOKEN_LENGTH: usize = 4096;

/// Short, stable identifier for a device token that is safe to put in logs.
#[must_use]
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}
