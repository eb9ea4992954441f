use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::constants::PUBLIC_KEY_LEN;
use crate::error::KeyproofError;
use crate::ids::{KeyId, UserId};

/// A user's published identity key, as served by `GET /api/users/{user_id}/keys`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBundleResponse {
    pub user_id: UserId,
    /// Base64 (standard, padded) X25519 public key.
    pub public_key: String,
    pub key_id: KeyId,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Body of `PUT /api/users/{user_id}/keys`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishKeysRequest {
    pub public_key: String,
    pub key_id: KeyId,
}

/// Decode a base64 public key and check it is exactly `PUBLIC_KEY_LEN` bytes.
pub fn decode_public_key(encoded: &str) -> Result<[u8; PUBLIC_KEY_LEN], KeyproofError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| KeyproofError::Validation(format!("invalid base64 public key: {e}")))?;

    bytes.as_slice().try_into().map_err(|_| {
        KeyproofError::Validation(format!(
            "expected {PUBLIC_KEY_LEN}-byte public key, got {} bytes",
            bytes.len()
        ))
    })
}

/// Encode raw public key bytes for the wire.
pub fn encode_public_key(key: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(key)
}
