//! Local persistence: the device identity and the per-counterparty trust records.

pub mod memory_store;
pub mod migrations;
pub mod sqlite_store;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyproof_shared::ids::{KeyId, UserId};
use rusqlite::Connection;

use crate::error::CryptoError;
use crate::key_bundle::PublicKey;
use crate::master_key::{self, DbEncryptionKey};

pub use memory_store::MemoryTrustStore;
pub use sqlite_store::SqliteTrustStore;

/// What this device knows about one counterparty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedIdentity {
    pub user_id: UserId,
    /// The key on file, first seen via TOFU or replaced on rotation.
    pub public_key: PublicKey,
    pub key_id: KeyId,
    pub first_seen_at: DateTime<Utc>,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Result of recording a counterparty's current key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityChange {
    /// No key was on file; this one is now trusted on first use.
    FirstSeen,
    Unchanged,
    /// The key or key id differs from the one on file. The new key replaced it
    /// and any prior verification was cleared.
    ReplacedExisting { was_verified: bool },
}

/// Key-value persistence for verification trust, keyed by counterparty.
///
/// Writes for one counterparty are last-writer-wins.
#[async_trait]
pub trait TrustStore: Send + Sync {
    /// The verified flag, `false` for unknown users.
    async fn get_verified(&self, user_id: &UserId) -> Result<bool, CryptoError>;

    /// Set or clear the verified flag. Setting it requires a key on file.
    async fn set_verified(&self, user_id: &UserId, verified: bool) -> Result<(), CryptoError>;

    /// Set the verified flag only while `public_key` is still the key on file.
    ///
    /// The check and the write are one atomic step. Returns `false` if the
    /// flag was already set. Fails with `NoPublishedKeys` when nothing is on
    /// file and `IdentityChanged` when a different key replaced it.
    async fn confirm_key(&self, user_id: &UserId, public_key: &PublicKey) -> Result<bool, CryptoError>;

    /// Forget the counterparty entirely: key on file and verification.
    async fn delete(&self, user_id: &UserId) -> Result<(), CryptoError>;

    async fn get_identity(&self, user_id: &UserId) -> Result<Option<TrustedIdentity>, CryptoError>;

    /// Record the counterparty's current key, detecting rotation.
    async fn save_identity(
        &self,
        user_id: &UserId,
        public_key: &PublicKey,
        key_id: KeyId,
    ) -> Result<IdentityChange, CryptoError>;
}

/// Open (or create) the encrypted trust database at `path` and migrate it.
pub fn open_encrypted(path: &Path, db_key: &DbEncryptionKey) -> Result<Connection, CryptoError> {
    let conn = Connection::open(path)?;
    master_key::apply_encryption_key(&conn, db_key)?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA foreign_keys=ON;
         PRAGMA busy_timeout=5000;",
    )?;
    migrations::run_crypto_migrations(&conn)?;
    tracing::debug!(path = %path.display(), "opened trust database");
    Ok(conn)
}

/// Open the trust database keyed from the OS keychain master key.
pub fn open_with_keychain(path: &Path) -> Result<Connection, CryptoError> {
    let master = master_key::init_master_key_from_keychain()?;
    let db_key = master_key::derive_db_encryption_key(&master)?;
    open_encrypted(path, &db_key)
}

/// Run `f` inside a transaction, committing only if it succeeds.
pub fn with_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, CryptoError>,
) -> Result<T, CryptoError> {
    let tx = conn.unchecked_transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

pub(crate) fn unix_now() -> i64 {
    Utc::now().timestamp()
}

pub(crate) fn from_unix(secs: i64) -> Result<DateTime<Utc>, CryptoError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| CryptoError::StorageError(format!("timestamp out of range: {secs}")))
}

/// In-memory SQLCipher database with migrations applied.
#[cfg(test)]
pub(crate) fn init_test_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "PRAGMA key = \"x'0000000000000000000000000000000000000000000000000000000000000000'\";",
    )
    .unwrap();
    migrations::run_crypto_migrations(&conn).unwrap();
    conn
}
