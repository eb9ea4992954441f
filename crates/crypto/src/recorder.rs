//! Persisting verification outcomes per counterparty.

use keyproof_shared::ids::UserId;

use crate::error::CryptoError;
use crate::key_bundle::{KeyBundle, PublicKey};
use crate::storage::{IdentityChange, TrustStore};

pub struct VerificationRecorder<S> {
    store: S,
}

impl<S: TrustStore> VerificationRecorder<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record that the user confirmed `compared_key` for the counterparty.
    ///
    /// The mark is only written while `compared_key` is still the key on
    /// file, and it is cleared when that key later changes. If the key was
    /// replaced after the comparison this fails with `IdentityChanged` and
    /// writes nothing. Marking twice is a no-op.
    pub async fn mark_verified(
        &self,
        user_id: &UserId,
        compared_key: &PublicKey,
    ) -> Result<(), CryptoError> {
        match self.store.confirm_key(user_id, compared_key).await {
            Ok(true) => {
                tracing::info!(%user_id, "counterparty verified");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(CryptoError::IdentityChanged { user_id }) => {
                tracing::warn!(%user_id, "key on file changed after comparison; not marking verified");
                Err(CryptoError::IdentityChanged { user_id })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn is_verified(&self, user_id: &UserId) -> Result<bool, CryptoError> {
        self.store.get_verified(user_id).await
    }

    /// Revoke a previous verification. Unknown users are ignored.
    pub async fn clear_verification(&self, user_id: &UserId) -> Result<(), CryptoError> {
        self.store.set_verified(user_id, false).await?;
        tracing::info!(%user_id, "verification cleared");
        Ok(())
    }

    /// Drop everything known about the counterparty, including the key on file.
    pub async fn forget(&self, user_id: &UserId) -> Result<(), CryptoError> {
        self.store.delete(user_id).await
    }

    /// Remember the counterparty key from a freshly fetched bundle.
    ///
    /// The first key seen is trusted on first use. A different key or key id
    /// replaces it and clears any verification.
    pub async fn observe_bundle(&self, bundle: &KeyBundle) -> Result<IdentityChange, CryptoError> {
        let user_id = bundle.owner().remote_id().ok_or_else(|| {
            CryptoError::InvalidKeyMaterial("cannot record our own bundle as a counterparty".into())
        })?;
        let change = self
            .store
            .save_identity(&user_id, bundle.public_key(), bundle.key_id())
            .await?;
        match change {
            IdentityChange::ReplacedExisting { was_verified } => {
                tracing::warn!(%user_id, key_id = %bundle.key_id(), was_verified, "counterparty identity key changed");
            }
            IdentityChange::FirstSeen => {
                tracing::debug!(%user_id, key_id = %bundle.key_id(), "recorded first-seen identity key");
            }
            IdentityChange::Unchanged => {}
        }
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_bundle::Owner;
    use crate::storage::{MemoryTrustStore, SqliteTrustStore};
    use chrono::Utc;
    use keyproof_shared::constants::PUBLIC_KEY_LEN;
    use keyproof_shared::ids::KeyId;

    fn key(b: u8) -> PublicKey {
        PublicKey::from_bytes([b; PUBLIC_KEY_LEN])
    }

    fn bundle(user_id: UserId, b: u8, key_id: KeyId) -> KeyBundle {
        KeyBundle::new(Owner::Remote(user_id), key(b), key_id, Utc::now())
    }

    #[tokio::test]
    async fn mark_verified_is_idempotent() {
        let recorder = VerificationRecorder::new(MemoryTrustStore::new());
        let user = UserId::new();
        recorder.observe_bundle(&bundle(user, 1, KeyId::new())).await.unwrap();

        recorder.mark_verified(&user, &key(1)).await.unwrap();
        let first_at = recorder.store().get_identity(&user).await.unwrap().unwrap().verified_at;
        recorder.mark_verified(&user, &key(1)).await.unwrap();

        assert!(recorder.is_verified(&user).await.unwrap());
        let identity = recorder.store().get_identity(&user).await.unwrap().unwrap();
        assert_eq!(identity.verified_at, first_at);
    }

    #[tokio::test]
    async fn mark_verified_without_key_on_file_is_no_published_keys() {
        let recorder = VerificationRecorder::new(MemoryTrustStore::new());
        let user = UserId::new();
        assert!(matches!(
            recorder.mark_verified(&user, &key(1)).await,
            Err(CryptoError::NoPublishedKeys { user_id }) if user_id == user
        ));
        assert!(!recorder.is_verified(&user).await.unwrap());
    }

    #[tokio::test]
    async fn mark_for_a_replaced_key_writes_nothing() {
        let recorder = VerificationRecorder::new(MemoryTrustStore::new());
        let user = UserId::new();
        recorder.observe_bundle(&bundle(user, 1, KeyId::new())).await.unwrap();
        recorder.observe_bundle(&bundle(user, 9, KeyId::new())).await.unwrap();

        assert!(matches!(
            recorder.mark_verified(&user, &key(1)).await,
            Err(CryptoError::IdentityChanged { user_id }) if user_id == user
        ));
        let identity = recorder.store().get_identity(&user).await.unwrap().unwrap();
        assert_eq!(identity.public_key, key(9));
        assert!(!identity.verified);
        assert!(identity.verified_at.is_none());
    }

    #[tokio::test]
    async fn unknown_user_is_unverified_and_clear_is_a_no_op() {
        let recorder = VerificationRecorder::new(MemoryTrustStore::new());
        let user = UserId::new();
        assert!(!recorder.is_verified(&user).await.unwrap());
        recorder.clear_verification(&user).await.unwrap();
        assert!(recorder.store().is_empty());
    }

    #[tokio::test]
    async fn clear_verification_revokes_but_keeps_key() {
        let recorder = VerificationRecorder::new(MemoryTrustStore::new());
        let user = UserId::new();
        recorder.observe_bundle(&bundle(user, 1, KeyId::new())).await.unwrap();
        recorder.mark_verified(&user, &key(1)).await.unwrap();

        recorder.clear_verification(&user).await.unwrap();
        assert!(!recorder.is_verified(&user).await.unwrap());
        assert!(recorder.store().get_identity(&user).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rotated_bundle_invalidates_verification() {
        let recorder = VerificationRecorder::new(MemoryTrustStore::new());
        let user = UserId::new();
        let key_id = KeyId::new();
        assert_eq!(
            recorder.observe_bundle(&bundle(user, 1, key_id)).await.unwrap(),
            IdentityChange::FirstSeen
        );
        recorder.mark_verified(&user, &key(1)).await.unwrap();

        assert_eq!(
            recorder.observe_bundle(&bundle(user, 1, key_id)).await.unwrap(),
            IdentityChange::Unchanged
        );
        assert!(recorder.is_verified(&user).await.unwrap());

        assert_eq!(
            recorder.observe_bundle(&bundle(user, 2, KeyId::new())).await.unwrap(),
            IdentityChange::ReplacedExisting { was_verified: true }
        );
        assert!(!recorder.is_verified(&user).await.unwrap());
    }

    #[tokio::test]
    async fn local_bundle_cannot_be_observed() {
        let recorder = VerificationRecorder::new(MemoryTrustStore::new());
        let own = KeyBundle::new(
            Owner::Local,
            PublicKey::from_bytes([1; PUBLIC_KEY_LEN]),
            KeyId::new(),
            Utc::now(),
        );
        assert!(recorder.observe_bundle(&own).await.is_err());
        assert!(recorder.store().is_empty());
    }

    #[tokio::test]
    async fn forget_removes_key_and_verification() {
        let store = SqliteTrustStore::new(crate::storage::init_test_db()).unwrap();
        let recorder = VerificationRecorder::new(store);
        let user = UserId::new();
        recorder.observe_bundle(&bundle(user, 1, KeyId::new())).await.unwrap();
        recorder.mark_verified(&user, &key(1)).await.unwrap();

        recorder.forget(&user).await.unwrap();
        assert!(!recorder.is_verified(&user).await.unwrap());
        assert!(matches!(
            recorder.mark_verified(&user, &key(1)).await,
            Err(CryptoError::NoPublishedKeys { .. })
        ));
    }
}
