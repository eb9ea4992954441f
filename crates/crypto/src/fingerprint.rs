//! Safety number generation for out-of-band identity verification.
//!
//! Two users compare a 60-digit number, read aloud or scanned from a QR code,
//! to confirm that neither of their identity keys was substituted in transit.
//! The number depends only on the two public keys, ordered canonically, so
//! both sides derive the same digits regardless of who is "local".

use keyproof_shared::constants::{SAFETY_NUMBER_DIGITS, SAFETY_NUMBER_GROUP_LEN};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;

use crate::error::CryptoError;
use crate::key_bundle::PublicKey;

/// Derivation version, mixed into the first hash round.
const FINGERPRINT_VERSION: u16 = 1;

/// Domain separation tag for the first hash round.
const FINGERPRINT_DOMAIN: &[u8] = b"keyproof-safety-number";

/// Number of SHA-512 rounds.
const FINGERPRINT_ITERATIONS: u32 = 5200;

/// Bytes of digest consumed per five-digit group.
const CHUNK_BYTES: usize = 5;

/// A 60-digit safety number.
#[derive(Clone, PartialEq, Eq)]
pub struct SafetyNumber(String);

impl SafetyNumber {
    /// The 60 digits with no separators.
    pub fn digits(&self) -> &str {
        &self.0
    }

    /// Human-readable form: 12 groups of 5 digits separated by spaces.
    pub fn display(&self) -> String {
        self.0
            .as_bytes()
            .chunks(SAFETY_NUMBER_GROUP_LEN)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Constant-time comparison.
    pub fn ct_eq(&self, other: &SafetyNumber) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::fmt::Display for SafetyNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}

impl std::fmt::Debug for SafetyNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SafetyNumber").field(&self.display()).finish()
    }
}

impl std::str::FromStr for SafetyNumber {
    type Err = CryptoError;

    /// Accepts either the compact or the grouped form; whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        if digits.len() != SAFETY_NUMBER_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CryptoError::MalformedPayload(format!(
                "safety number must be {SAFETY_NUMBER_DIGITS} decimal digits"
            )));
        }
        Ok(Self(digits))
    }
}

/// Generate the safety number for two raw public keys.
///
/// Both keys must be exactly `PUBLIC_KEY_LEN` bytes. Argument order does not
/// matter.
pub fn generate_safety_number(a: &[u8], b: &[u8]) -> Result<SafetyNumber, CryptoError> {
    let a = PublicKey::from_slice(a)?;
    let b = PublicKey::from_slice(b)?;
    Ok(safety_number_for(&a, &b))
}

/// Typed variant of [`generate_safety_number`].
pub fn safety_number_for(a: &PublicKey, b: &PublicKey) -> SafetyNumber {
    // Byte-lexicographic ordering makes the result symmetric.
    let (first, second) = if a <= b { (a, b) } else { (b, a) };

    let mut digest = Sha512::new()
        .chain_update(FINGERPRINT_VERSION.to_be_bytes())
        .chain_update(FINGERPRINT_DOMAIN)
        .chain_update(first.as_bytes())
        .chain_update(second.as_bytes())
        .finalize();
    for _ in 1..FINGERPRINT_ITERATIONS {
        digest = Sha512::new()
            .chain_update(digest)
            .chain_update(first.as_bytes())
            .chain_update(second.as_bytes())
            .finalize();
    }

    let groups = SAFETY_NUMBER_DIGITS / SAFETY_NUMBER_GROUP_LEN;
    let mut digits = String::with_capacity(SAFETY_NUMBER_DIGITS);
    for chunk in digest.chunks(CHUNK_BYTES).take(groups) {
        let value = chunk
            .iter()
            .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte))
            % 100_000;
        digits.push_str(&format!("{value:05}"));
    }

    SafetyNumber(digits)
}
