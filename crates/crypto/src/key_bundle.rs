//! Published identity key bundles and the fixed-size public key type.

use chrono::{DateTime, Utc};
use keyproof_shared::api::keys::{
    decode_public_key, encode_public_key, KeyBundleResponse, PublishKeysRequest,
};
use keyproof_shared::constants::PUBLIC_KEY_LEN;
use keyproof_shared::ids::{KeyId, UserId};
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

/// An X25519 identity public key. Always exactly `PUBLIC_KEY_LEN` bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyMaterial(format!(
                "expected {PUBLIC_KEY_LEN}-byte public key, got {} bytes",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        decode_public_key(encoded)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        encode_public_key(&self.0)
    }

    /// Constant-time equality, for comparing against untrusted input.
    pub fn ct_eq(&self, other: &PublicKey) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_base64()).finish()
    }
}

/// Whose key a bundle holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// This device's own identity.
    Local,
    Remote(UserId),
}

impl Owner {
    pub fn remote_id(&self) -> Option<UserId> {
        match self {
            Owner::Local => None,
            Owner::Remote(id) => Some(*id),
        }
    }
}

/// One user's published encryption identity.
///
/// Immutable: a key rotation produces a new bundle with a new `key_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBundle {
    owner: Owner,
    public_key: PublicKey,
    key_id: KeyId,
    created_at: DateTime<Utc>,
}

impl KeyBundle {
    pub fn new(owner: Owner, public_key: PublicKey, key_id: KeyId, created_at: DateTime<Utc>) -> Self {
        Self {
            owner,
            public_key,
            key_id,
            created_at,
        }
    }

    /// Build a remote bundle from a directory response.
    pub fn from_response(resp: &KeyBundleResponse) -> Result<Self, CryptoError> {
        Ok(Self {
            owner: Owner::Remote(resp.user_id),
            public_key: PublicKey::from_base64(&resp.public_key)?,
            key_id: resp.key_id,
            created_at: resp.created_at,
        })
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The request body that publishes this bundle to a key directory.
    pub fn to_publish_request(&self) -> PublishKeysRequest {
        PublishKeysRequest {
            public_key: self.public_key.to_base64(),
            key_id: self.key_id,
        }
    }
}
