//! Wires the fetcher, generator, codec, matcher and recorder into the
//! verification flow a client drives.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use keyproof_shared::ids::{KeyId, UserId};

use crate::config::ClientConfig;
use crate::directory::{HttpKeyDirectory, KeyBundleFetcher, KeyDirectory};
use crate::error::CryptoError;
use crate::fingerprint::{safety_number_for, SafetyNumber};
use crate::identity;
use crate::key_bundle::{KeyBundle, PublicKey};
use crate::matcher::{ChallengeMatcher, ExpectedKeys, MatchState, Verdict};
use crate::payload::{self, VerificationPayload};
use crate::recorder::VerificationRecorder;
use crate::storage::{self, IdentityChange, SqliteTrustStore, TrustStore};

pub struct VerificationService<D, S> {
    own_key: PublicKey,
    own_key_id: KeyId,
    fetcher: KeyBundleFetcher<D>,
    recorder: VerificationRecorder<S>,
    in_progress: DashMap<UserId, ()>,
}

impl VerificationService<HttpKeyDirectory, SqliteTrustStore> {
    /// Open the keychain-encrypted trust database and connect to the
    /// configured directory.
    ///
    /// Fails with `KeysNotConfigured` if this device has no identity yet.
    pub fn from_config(config: &ClientConfig) -> Result<Self, CryptoError> {
        let conn = storage::open_with_keychain(&config.database_path)?;
        let local = identity::require_local_identity(&conn)?;
        let directory = HttpKeyDirectory::from_config(config)?;
        Ok(Self::new(
            local,
            KeyBundleFetcher::new(directory, Duration::from_secs(config.request_timeout_secs)),
            VerificationRecorder::new(SqliteTrustStore::new(conn)?),
        ))
    }
}

impl<D: KeyDirectory, S: TrustStore> VerificationService<D, S> {
    pub fn new(
        local: (PublicKey, KeyId),
        fetcher: KeyBundleFetcher<D>,
        recorder: VerificationRecorder<S>,
    ) -> Self {
        let (own_key, own_key_id) = local;
        Self {
            own_key,
            own_key_id,
            fetcher,
            recorder,
            in_progress: DashMap::new(),
        }
    }

    pub fn own_key(&self) -> &PublicKey {
        &self.own_key
    }

    pub fn own_key_id(&self) -> KeyId {
        self.own_key_id
    }

    pub fn recorder(&self) -> &VerificationRecorder<S> {
        &self.recorder
    }

    /// Fetch the counterparty's current bundle and record it on file.
    pub async fn counterparty_bundle(&self, user_id: &UserId) -> Result<KeyBundle, CryptoError> {
        let bundle = self.fetcher.fetch(user_id).await?;
        if let IdentityChange::ReplacedExisting { was_verified: true } =
            self.recorder.observe_bundle(&bundle).await?
        {
            tracing::warn!(%user_id, "verified counterparty changed keys; verification revoked");
        }
        Ok(bundle)
    }

    pub async fn safety_number(&self, user_id: &UserId) -> Result<SafetyNumber, CryptoError> {
        let bundle = self.counterparty_bundle(user_id).await?;
        Ok(safety_number_for(&self.own_key, bundle.public_key()))
    }

    /// The code this device shows for `user_id` to scan.
    pub async fn verification_qr(&self, user_id: &UserId) -> Result<String, CryptoError> {
        let bundle = self.counterparty_bundle(user_id).await?;
        payload::encode(&VerificationPayload::for_keys(self.own_key, *bundle.public_key()))
    }

    /// Start verifying `user_id`.
    ///
    /// Only one attempt per counterparty may be alive at a time; the slot is
    /// released when the returned attempt is dropped.
    pub async fn begin(&self, user_id: &UserId) -> Result<VerificationAttempt<'_, D, S>, CryptoError> {
        let guard = match self.in_progress.entry(*user_id) {
            Entry::Occupied(_) => return Err(CryptoError::VerificationInProgress { user_id: *user_id }),
            Entry::Vacant(slot) => {
                slot.insert(());
                InProgressGuard {
                    slots: &self.in_progress,
                    user_id: *user_id,
                }
            }
        };

        let bundle = self.counterparty_bundle(user_id).await?;
        tracing::debug!(%user_id, key_id = %bundle.key_id(), "verification attempt started");
        Ok(VerificationAttempt {
            service: self,
            user_id: *user_id,
            expected: ExpectedKeys {
                own: self.own_key,
                counterparty: *bundle.public_key(),
            },
            matcher: ChallengeMatcher::new(),
            _guard: guard,
        })
    }

    pub async fn is_verified(&self, user_id: &UserId) -> Result<bool, CryptoError> {
        self.recorder.is_verified(user_id).await
    }

    pub async fn clear_verification(&self, user_id: &UserId) -> Result<(), CryptoError> {
        self.recorder.clear_verification(user_id).await
    }
}

struct InProgressGuard<'a> {
    slots: &'a DashMap<UserId, ()>,
    user_id: UserId,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.slots.remove(&self.user_id);
    }
}

/// One in-progress verification of a counterparty.
pub struct VerificationAttempt<'a, D, S> {
    service: &'a VerificationService<D, S>,
    user_id: UserId,
    expected: ExpectedKeys,
    matcher: ChallengeMatcher,
    _guard: InProgressGuard<'a>,
}

impl<D: KeyDirectory, S: TrustStore> VerificationAttempt<'_, D, S> {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn state(&self) -> MatchState {
        self.matcher.state()
    }

    /// The number to show for manual comparison.
    pub fn safety_number(&self) -> SafetyNumber {
        safety_number_for(&self.expected.own, &self.expected.counterparty)
    }

    pub fn open_scanner(&mut self) -> Result<(), CryptoError> {
        self.matcher.open_scanner()
    }

    pub fn cancel(&mut self) -> Result<(), CryptoError> {
        self.matcher.cancel()
    }

    pub fn reset(&mut self) -> Result<(), CryptoError> {
        self.matcher.reset()
    }

    /// Check a scanned code and record the counterparty as verified if it matches.
    ///
    /// The mark is bound to the key this attempt compared against. If the key
    /// on file was replaced since [`VerificationService::begin`], this fails
    /// with `IdentityChanged` and nothing is recorded.
    pub async fn submit_scan(&mut self, raw: &str) -> Result<Verdict, CryptoError> {
        let verdict = self.matcher.submit_scan(raw, &self.expected)?;
        if verdict == Verdict::Accepted {
            self.service
                .recorder
                .mark_verified(&self.user_id, &self.expected.counterparty)
                .await?;
        }
        Ok(verdict)
    }

    /// The user compared the digits by eye and confirmed they match.
    pub async fn confirm_manual_comparison(&mut self) -> Result<(), CryptoError> {
        if self.matcher.state().is_terminal() {
            return Err(CryptoError::InvalidTransition {
                from: "finished",
                action: "confirm comparison",
            });
        }
        self.service
            .recorder
            .mark_verified(&self.user_id, &self.expected.counterparty)
            .await
    }
}
