//! The device's own identity key pair.
//!
//! Generates X25519 identity keys, persists them in the encrypted trust
//! database, and exposes the public half for publishing and verification.

use chrono::{DateTime, Utc};
use keyproof_shared::ids::KeyId;
use rusqlite::{Connection, OptionalExtension};
use x25519_dalek::StaticSecret;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::key_bundle::{KeyBundle, Owner, PublicKey};
use crate::storage::{from_unix, unix_now, with_transaction};

/// The local identity. The secret half is zeroized on drop.
pub struct LocalIdentity {
    secret: StaticSecret,
    public_key: PublicKey,
    key_id: KeyId,
    created_at: DateTime<Utc>,
}

impl std::fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("public_key", &self.public_key)
            .field("key_id", &self.key_id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl LocalIdentity {
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// X25519 agreement with a counterparty's identity key, for the session layer.
    pub fn diffie_hellman(&self, their_key: &PublicKey) -> x25519_dalek::SharedSecret {
        self.secret
            .diffie_hellman(&x25519_dalek::PublicKey::from(*their_key.as_bytes()))
    }

    /// The bundle to publish to the key directory.
    pub fn bundle(&self) -> KeyBundle {
        KeyBundle::new(Owner::Local, self.public_key, self.key_id, self.created_at)
    }
}

fn new_key_pair() -> (StaticSecret, PublicKey) {
    let mut seed = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut seed);
    let secret = StaticSecret::from(seed);
    seed.zeroize();
    let public = x25519_dalek::PublicKey::from(&secret);
    (secret, PublicKey::from_bytes(public.to_bytes()))
}

fn insert_identity(conn: &Connection) -> Result<LocalIdentity, CryptoError> {
    let (secret, public_key) = new_key_pair();
    let key_id = KeyId::new();
    let created_at = unix_now();

    let mut private_bytes = secret.to_bytes();
    let inserted = conn.execute(
        "INSERT INTO crypto_identity_keys (id, public_key, private_key, key_id, created_at)
         VALUES (1, ?1, ?2, ?3, ?4)",
        rusqlite::params![
            public_key.as_bytes().as_slice(),
            private_bytes.as_slice(),
            key_id.to_string(),
            created_at
        ],
    );
    private_bytes.zeroize();
    inserted?;

    Ok(LocalIdentity {
        secret,
        public_key,
        key_id,
        created_at: from_unix(created_at)?,
    })
}

/// Generate a new identity key pair and store it.
///
/// Fails if an identity already exists; use [`rotate_identity`] to replace one.
pub fn generate_identity(conn: &Connection) -> Result<LocalIdentity, CryptoError> {
    let identity = with_transaction(conn, |tx| {
        if local_identity(tx)?.is_some() {
            return Err(CryptoError::StorageError("identity already exists".into()));
        }
        insert_identity(tx)
    })?;
    tracing::info!(key_id = %identity.key_id, "generated local identity");
    Ok(identity)
}

/// Load the full local identity, including the secret key.
pub fn get_identity(conn: &Connection) -> Result<LocalIdentity, CryptoError> {
    let row: Option<(Vec<u8>, Vec<u8>, String, i64)> = conn
        .query_row(
            "SELECT public_key, private_key, key_id, created_at FROM crypto_identity_keys WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;
    let (public_bytes, mut private_bytes, key_id, created_at) =
        row.ok_or(CryptoError::KeysNotConfigured)?;

    let seed: Result<[u8; 32], _> = private_bytes.as_slice().try_into();
    private_bytes.zeroize();
    let mut seed =
        seed.map_err(|_| CryptoError::StorageError("stored private key has wrong length".into()))?;
    let secret = StaticSecret::from(seed);
    seed.zeroize();

    let public_key = PublicKey::from_slice(&public_bytes)?;
    let derived = x25519_dalek::PublicKey::from(&secret);
    if derived.as_bytes() != public_key.as_bytes() {
        return Err(CryptoError::StorageError(
            "stored public key does not match private key".into(),
        ));
    }

    Ok(LocalIdentity {
        secret,
        public_key,
        key_id: key_id
            .parse()
            .map_err(|_| CryptoError::StorageError(format!("invalid stored key_id: {key_id}")))?,
        created_at: from_unix(created_at)?,
    })
}

/// The local public key and key id, or `None` if no identity exists yet.
pub fn local_identity(conn: &Connection) -> Result<Option<(PublicKey, KeyId)>, CryptoError> {
    let row: Option<(Vec<u8>, String)> = conn
        .query_row(
            "SELECT public_key, key_id FROM crypto_identity_keys WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    row.map(|(public_bytes, key_id)| {
        let key_id = key_id
            .parse()
            .map_err(|_| CryptoError::StorageError(format!("invalid stored key_id: {key_id}")))?;
        Ok((PublicKey::from_slice(&public_bytes)?, key_id))
    })
    .transpose()
}

/// Like [`local_identity`], but a missing identity is `KeysNotConfigured`.
pub fn require_local_identity(conn: &Connection) -> Result<(PublicKey, KeyId), CryptoError> {
    local_identity(conn)?.ok_or(CryptoError::KeysNotConfigured)
}

/// Replace the local identity with a fresh key pair and key id.
///
/// The old public key is kept in `crypto_retired_identity_keys`. Counterparties
/// see the new key id on their next fetch and drop their verification of us.
pub fn rotate_identity(conn: &Connection) -> Result<LocalIdentity, CryptoError> {
    let identity = with_transaction(conn, |tx| {
        let (old_key, old_key_id) = require_local_identity(tx)?;
        let old_created_at: i64 = tx.query_row(
            "SELECT created_at FROM crypto_identity_keys WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO crypto_retired_identity_keys (key_id, public_key, created_at, retired_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                old_key_id.to_string(),
                old_key.as_bytes().as_slice(),
                old_created_at,
                unix_now()
            ],
        )?;
        tx.execute("DELETE FROM crypto_identity_keys WHERE id = 1", [])?;
        insert_identity(tx)
    })?;
    tracing::info!(key_id = %identity.key_id, "rotated local identity");
    Ok(identity)
}
