//! keyproof-crypto: identity key verification for end-to-end encryption.
//!
//! Fetches counterparties' published identity keys, derives a symmetric
//! 60-digit safety number, encodes and checks QR verification codes, and
//! records verification outcomes in an encrypted SQLite (SQLCipher) database.

pub mod config;
pub mod directory;
pub mod error;
pub mod master_key;
pub mod storage;
pub mod identity;
pub mod key_bundle;
pub mod fingerprint;
pub mod payload;
pub mod matcher;
pub mod recorder;
pub mod service;
