//! At-rest encryption key for the local trust database.
//!
//! A 32-byte master key lives in the OS keychain. The SQLCipher key is derived
//! from it with HKDF-SHA256, so the raw master key never reaches SQLite.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

const KEYCHAIN_SERVICE: &str = "dev.keyproof.crypto";
const KEYCHAIN_ACCOUNT: &str = "master_key";
const DB_KEY_INFO: &[u8] = b"keyproof-db-encryption-v1";

/// A 32-byte master key, wiped from memory on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; 32],
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl MasterKey {
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

/// Hex key literal for SQLCipher's `PRAGMA key`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DbEncryptionKey {
    literal: String,
}

impl std::fmt::Debug for DbEncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbEncryptionKey")
            .field("literal", &"[REDACTED]")
            .finish()
    }
}

impl DbEncryptionKey {
    /// The full `x'...'` literal.
    pub fn as_pragma_value(&self) -> &str {
        &self.literal
    }
}

/// Load the master key from the OS keychain, creating it on first run.
pub fn init_master_key_from_keychain() -> Result<MasterKey, CryptoError> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_ACCOUNT)
        .map_err(|_| CryptoError::KeychainUnavailable)?;

    match entry.get_password() {
        Ok(mut stored) => {
            let decoded = hex_decode(&stored);
            stored.zeroize();
            let mut bytes = decoded
                .ok_or_else(|| CryptoError::KeychainError("malformed master key in keychain".into()))?;
            let key: Result<[u8; 32], _> = bytes.as_slice().try_into();
            bytes.zeroize();
            key.map(MasterKey::from_bytes)
                .map_err(|_| CryptoError::KeychainError("malformed master key in keychain".into()))
        }
        Err(keyring::Error::NoEntry) => {
            let mut key = [0u8; 32];
            rand::RngCore::fill_bytes(&mut rand::rng(), &mut key);
            let mut encoded = hex_encode(&key);
            let stored = entry.set_password(&encoded);
            encoded.zeroize();
            stored?;
            tracing::info!("created new master key in OS keychain");
            Ok(MasterKey::from_bytes(key))
        }
        Err(e) => Err(CryptoError::from(e)),
    }
}

/// Derive the SQLCipher key from the master key.
pub fn derive_db_encryption_key(master_key: &MasterKey) -> Result<DbEncryptionKey, CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, master_key.as_bytes());
    let mut okm = [0u8; 32];
    hk.expand(DB_KEY_INFO, &mut okm)
        .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?;

    let mut hex = hex_encode(&okm);
    okm.zeroize();
    let key = DbEncryptionKey {
        literal: format!("x'{hex}'"),
    };
    hex.zeroize();
    Ok(key)
}

/// Key a freshly opened connection and confirm SQLCipher is linked in.
pub fn apply_encryption_key(
    conn: &rusqlite::Connection,
    db_key: &DbEncryptionKey,
) -> Result<(), CryptoError> {
    // The x'..' literal cannot be a bound parameter: SQLCipher would treat it
    // as a passphrase and run it through PBKDF2.
    conn.execute_batch(&format!("PRAGMA key = \"{}\";", db_key.as_pragma_value()))?;

    let cipher_version: String = conn
        .pragma_query_value(None, "cipher_version", |row| row.get(0))
        .map_err(|_| CryptoError::StorageError("SQLCipher not available".into()))?;
    if cipher_version.is_empty() {
        return Err(CryptoError::StorageError("SQLCipher not available".into()));
    }
    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
