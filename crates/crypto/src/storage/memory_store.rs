//! In-memory [`TrustStore`] for tests and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use keyproof_shared::ids::{KeyId, UserId};

use super::{IdentityChange, TrustStore, TrustedIdentity};
use crate::error::CryptoError;
use crate::key_bundle::PublicKey;

#[derive(Debug, Default)]
pub struct MemoryTrustStore {
    identities: DashMap<UserId, TrustedIdentity>,
}

impl MemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

#[async_trait]
impl TrustStore for MemoryTrustStore {
    async fn get_verified(&self, user_id: &UserId) -> Result<bool, CryptoError> {
        Ok(self
            .identities
            .get(user_id)
            .map(|identity| identity.verified)
            .unwrap_or(false))
    }

    async fn set_verified(&self, user_id: &UserId, verified: bool) -> Result<(), CryptoError> {
        match self.identities.get_mut(user_id) {
            Some(mut identity) => {
                identity.verified = verified;
                identity.verified_at = verified.then(Utc::now);
                Ok(())
            }
            None if verified => Err(CryptoError::StorageError(format!(
                "no identity on file for user {user_id}"
            ))),
            None => Ok(()),
        }
    }

    async fn confirm_key(&self, user_id: &UserId, public_key: &PublicKey) -> Result<bool, CryptoError> {
        let mut identity = self
            .identities
            .get_mut(user_id)
            .ok_or(CryptoError::NoPublishedKeys { user_id: *user_id })?;
        if !identity.public_key.ct_eq(public_key) {
            return Err(CryptoError::IdentityChanged { user_id: *user_id });
        }
        if identity.verified {
            return Ok(false);
        }
        identity.verified = true;
        identity.verified_at = Some(Utc::now());
        Ok(true)
    }

    async fn delete(&self, user_id: &UserId) -> Result<(), CryptoError> {
        self.identities.remove(user_id);
        Ok(())
    }

    async fn get_identity(&self, user_id: &UserId) -> Result<Option<TrustedIdentity>, CryptoError> {
        Ok(self.identities.get(user_id).map(|identity| identity.clone()))
    }

    async fn save_identity(
        &self,
        user_id: &UserId,
        public_key: &PublicKey,
        key_id: KeyId,
    ) -> Result<IdentityChange, CryptoError> {
        let change = match self.identities.entry(*user_id) {
            Entry::Vacant(slot) => {
                slot.insert(TrustedIdentity {
                    user_id: *user_id,
                    public_key: *public_key,
                    key_id,
                    first_seen_at: Utc::now(),
                    verified: false,
                    verified_at: None,
                });
                IdentityChange::FirstSeen
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if existing.key_id == key_id && existing.public_key.ct_eq(public_key) {
                    IdentityChange::Unchanged
                } else {
                    let was_verified = existing.verified;
                    existing.public_key = *public_key;
                    existing.key_id = key_id;
                    existing.verified = false;
                    existing.verified_at = None;
                    IdentityChange::ReplacedExisting { was_verified }
                }
            }
        };
        Ok(change)
    }
}
