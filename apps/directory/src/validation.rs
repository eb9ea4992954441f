use keyproof_shared::api::keys::decode_public_key;
use keyproof_shared::error::KeyproofError;
use keyproof_shared::ids::UserId;

use crate::error::ServerError;

/// Parse a user id taken from the request path.
pub fn parse_user_id(raw: &str) -> Result<UserId, ServerError> {
    raw.parse()
        .map_err(|_| KeyproofError::Validation(format!("invalid user id: {raw}")).into())
}

/// Check that a published key is base64 of exactly 32 bytes.
///
/// Returns the key normalized to the canonical encoding so that equal keys
/// compare equal as strings.
pub fn validate_public_key(encoded: &str) -> Result<String, ServerError> {
    let bytes = decode_public_key(encoded.trim())?;
    Ok(keyproof_shared::api::keys::encode_public_key(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyproof_shared::api::keys::encode_public_key;

    #[test]
    fn parse_user_id_accepts_uuid() {
        let id = UserId::new();
        assert_eq!(parse_user_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn parse_user_id_rejects_garbage() {
        assert!(parse_user_id("not-a-uuid").is_err());
        assert!(parse_user_id("").is_err());
    }

    #[test]
    fn validate_public_key_accepts_32_bytes() {
        let encoded = encode_public_key(&[9u8; 32]);
        assert_eq!(validate_public_key(&encoded).unwrap(), encoded);
    }

    #[test]
    fn validate_public_key_trims_whitespace() {
        let encoded = encode_public_key(&[9u8; 32]);
        assert_eq!(validate_public_key(&format!(" {encoded}\n")).unwrap(), encoded);
    }

    #[test]
    fn validate_public_key_rejects_wrong_length_and_bad_base64() {
        assert!(validate_public_key(&encode_public_key(&[9u8; 31])).is_err());
        assert!(validate_public_key(&encode_public_key(&[9u8; 33])).is_err());
        assert!(validate_public_key("!!!not base64!!!").is_err());
    }
}
