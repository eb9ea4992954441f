//! SQLite-backed [`TrustStore`].

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use keyproof_shared::ids::{KeyId, UserId};
use rusqlite::{Connection, OptionalExtension};

use super::{from_unix, migrations, unix_now, IdentityChange, TrustStore, TrustedIdentity};
use crate::error::CryptoError;
use crate::key_bundle::PublicKey;

pub struct SqliteTrustStore {
    conn: Mutex<Connection>,
}

impl SqliteTrustStore {
    /// Wrap an open connection, applying any pending migrations.
    pub fn new(conn: Connection) -> Result<Self, CryptoError> {
        migrations::run_crypto_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CryptoError> {
        self.conn
            .lock()
            .map_err(|e| CryptoError::StorageError(format!("trust DB lock poisoned: {e}")))
    }
}

type IdentityRow = (String, Vec<u8>, String, i64, bool, Option<i64>);

fn identity_from_row(row: IdentityRow) -> Result<TrustedIdentity, CryptoError> {
    let (user_id, public_key, key_id, first_seen_at, verified, verified_at) = row;
    Ok(TrustedIdentity {
        user_id: user_id
            .parse()
            .map_err(|_| CryptoError::StorageError(format!("invalid stored user_id: {user_id}")))?,
        public_key: PublicKey::from_slice(&public_key)
            .map_err(|e| CryptoError::StorageError(format!("stored key for {user_id}: {e}")))?,
        key_id: key_id
            .parse()
            .map_err(|_| CryptoError::StorageError(format!("invalid stored key_id: {key_id}")))?,
        first_seen_at: from_unix(first_seen_at)?,
        verified,
        verified_at: verified_at.map(from_unix).transpose()?,
    })
}

fn load_identity(conn: &Connection, user_id: &UserId) -> Result<Option<TrustedIdentity>, CryptoError> {
    let row: Option<IdentityRow> = conn
        .query_row(
            "SELECT user_id, public_key, key_id, first_seen_at, verified, verified_at
             FROM crypto_trusted_identities WHERE user_id = ?1",
            [user_id.to_string()],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .optional()?;
    row.map(identity_from_row).transpose()
}

#[async_trait]
impl TrustStore for SqliteTrustStore {
    async fn get_verified(&self, user_id: &UserId) -> Result<bool, CryptoError> {
        let conn = self.lock()?;
        let verified: Option<bool> = conn
            .query_row(
                "SELECT verified FROM crypto_trusted_identities WHERE user_id = ?1",
                [user_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(verified.unwrap_or(false))
    }

    async fn set_verified(&self, user_id: &UserId, verified: bool) -> Result<(), CryptoError> {
        let conn = self.lock()?;
        let verified_at = verified.then(unix_now);
        let updated = conn.execute(
            "UPDATE crypto_trusted_identities SET verified = ?2, verified_at = ?3 WHERE user_id = ?1",
            rusqlite::params![user_id.to_string(), verified, verified_at],
        )?;
        if updated == 0 && verified {
            return Err(CryptoError::StorageError(format!(
                "no identity on file for user {user_id}"
            )));
        }
        tracing::debug!(%user_id, verified, "stored verification flag");
        Ok(())
    }

    async fn confirm_key(&self, user_id: &UserId, public_key: &PublicKey) -> Result<bool, CryptoError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let identity = load_identity(&tx, user_id)?
            .ok_or(CryptoError::NoPublishedKeys { user_id: *user_id })?;
        if !identity.public_key.ct_eq(public_key) {
            return Err(CryptoError::IdentityChanged { user_id: *user_id });
        }
        if identity.verified {
            return Ok(false);
        }
        let updated = tx.execute(
            "UPDATE crypto_trusted_identities SET verified = 1, verified_at = ?3
             WHERE user_id = ?1 AND public_key = ?2",
            rusqlite::params![
                user_id.to_string(),
                public_key.as_bytes().as_slice(),
                unix_now()
            ],
        )?;
        if updated != 1 {
            return Err(CryptoError::IdentityChanged { user_id: *user_id });
        }

        tx.commit()?;
        tracing::debug!(%user_id, key_id = %identity.key_id, "stored verification for key on file");
        Ok(true)
    }

    async fn delete(&self, user_id: &UserId) -> Result<(), CryptoError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM crypto_trusted_identities WHERE user_id = ?1",
            [user_id.to_string()],
        )?;
        Ok(())
    }

    async fn get_identity(&self, user_id: &UserId) -> Result<Option<TrustedIdentity>, CryptoError> {
        let conn = self.lock()?;
        load_identity(&conn, user_id)
    }

    async fn save_identity(
        &self,
        user_id: &UserId,
        public_key: &PublicKey,
        key_id: KeyId,
    ) -> Result<IdentityChange, CryptoError> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let change = match load_identity(&tx, user_id)? {
            None => {
                tx.execute(
                    "INSERT INTO crypto_trusted_identities (user_id, public_key, key_id, first_seen_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![
                        user_id.to_string(),
                        public_key.as_bytes().as_slice(),
                        key_id.to_string(),
                        unix_now()
                    ],
                )?;
                IdentityChange::FirstSeen
            }
            Some(existing) if existing.key_id == key_id && existing.public_key.ct_eq(public_key) => {
                IdentityChange::Unchanged
            }
            Some(existing) => {
                tx.execute(
                    "UPDATE crypto_trusted_identities
                     SET public_key = ?2, key_id = ?3, verified = 0, verified_at = NULL
                     WHERE user_id = ?1",
                    rusqlite::params![
                        user_id.to_string(),
                        public_key.as_bytes().as_slice(),
                        key_id.to_string()
                    ],
                )?;
                IdentityChange::ReplacedExisting {
                    was_verified: existing.verified,
                }
            }
        };

        tx.commit()?;
        Ok(change)
    }
}
