//! Error types for the keyproof-crypto crate.

use keyproof_shared::ids::UserId;
use thiserror::Error;

/// Errors raised by key verification and its storage.
///
/// A rejected verification is not an error: the matcher reports it as
/// [`crate::matcher::Verdict::Rejected`].
#[derive(Debug, Error)]
pub enum CryptoError {
    /// This device has no identity key pair yet. Recoverable by running key setup.
    #[error("local identity keys are not configured")]
    KeysNotConfigured,

    /// The counterparty has never published keys; verification is impossible
    /// until they set up encryption.
    #[error("user {user_id} has not published any keys")]
    NoPublishedKeys { user_id: UserId },

    /// The key directory could not be reached or answered badly. Retryable.
    #[error("key lookup failed: {0}")]
    RemoteLookupFailed(String),

    /// Key bytes of the wrong size or otherwise unusable.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// The scanned payload is not a well-formed verification envelope.
    #[error("malformed verification payload: {0}")]
    MalformedPayload(String),

    /// The scanned payload was produced by a newer, incompatible client.
    #[error("unsupported payload version {found} (newest supported is {supported})")]
    UnsupportedVersion { found: u64, supported: u32 },

    /// The scanned payload carries a different `type` discriminator.
    #[error("unexpected payload type: {0}")]
    TypeMismatch(String),

    /// The key on file changed after it was compared, so the comparison no
    /// longer vouches for it. Start a new attempt against the current key.
    #[error("identity key for user {user_id} changed before verification was recorded")]
    IdentityChanged { user_id: UserId },

    /// Another verification attempt for the same counterparty is still running.
    #[error("verification already in progress for user {user_id}")]
    VerificationInProgress { user_id: UserId },

    /// A matcher event arrived in a state that does not accept it.
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },

    /// Database storage error.
    #[error("storage error: {0}")]
    StorageError(String),

    /// OS keychain operation failed.
    #[error("keychain error: {0}")]
    KeychainError(String),

    /// No credential found in the OS keychain for the requested entry.
    #[error("keychain entry not found")]
    KeychainEntryNotFound,

    /// OS keychain is not available on this platform.
    #[error("keychain unavailable")]
    KeychainUnavailable,

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl CryptoError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CryptoError::RemoteLookupFailed(_))
    }

    /// Whether the failure came from scanned input and a fresh scan may fix it.
    pub fn is_rescannable(&self) -> bool {
        matches!(
            self,
            CryptoError::MalformedPayload(_)
                | CryptoError::UnsupportedVersion { .. }
                | CryptoError::TypeMismatch(_)
        )
    }
}

impl From<rusqlite::Error> for CryptoError {
    fn from(err: rusqlite::Error) -> Self {
        CryptoError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        CryptoError::SerializationError(err.to_string())
    }
}

impl From<CryptoError> for keyproof_shared::error::KeyproofError {
    fn from(err: CryptoError) -> Self {
        keyproof_shared::error::KeyproofError::Crypto(err.to_string())
    }
}

impl From<keyring::Error> for CryptoError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::NoEntry => CryptoError::KeychainEntryNotFound,
            keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_) => {
                CryptoError::KeychainUnavailable
            }
            other => CryptoError::KeychainError(other.to_string()),
        }
    }
}
