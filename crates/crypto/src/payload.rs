//! QR code payload for key verification.
//!
//! The payload is a small JSON envelope:
//!
//! ```text
//! {"type":"key_verification","version":2,"self_key":"<b64>","counterparty_key":"<b64>","safety_number":"<60 digits>"}
//! ```
//!
//! `self_key` is the presenter's own key and `counterparty_key` is the scanner's
//! key as the presenter knows it. Version 1 carried the safety number in its
//! grouped display form. Version 2 carries the bare digits.

use keyproof_shared::constants::MAX_PAYLOAD_LEN;
use serde::Serialize;
use serde_json::Value;

use crate::error::CryptoError;
use crate::fingerprint::{safety_number_for, SafetyNumber};
use crate::key_bundle::PublicKey;

pub const PAYLOAD_TYPE: &str = "key_verification";
pub const CURRENT_VERSION: u32 = 2;
pub const OLDEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationPayload {
    pub version: u32,
    pub self_key: PublicKey,
    pub counterparty_key: PublicKey,
    pub safety_number: SafetyNumber,
}

impl VerificationPayload {
    /// Build a current-version payload, computing the safety number.
    pub fn for_keys(self_key: PublicKey, counterparty_key: PublicKey) -> Self {
        Self {
            version: CURRENT_VERSION,
            safety_number: safety_number_for(&self_key, &counterparty_key),
            self_key,
            counterparty_key,
        }
    }
}

#[derive(Serialize)]
struct WireEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    version: u32,
    self_key: String,
    counterparty_key: String,
    safety_number: String,
}

/// Serialize a payload in the wire shape of its `version`.
pub fn encode(payload: &VerificationPayload) -> Result<String, CryptoError> {
    let safety_number = match payload.version {
        1 => payload.safety_number.display(),
        2 => payload.safety_number.digits().to_owned(),
        other => {
            return Err(CryptoError::UnsupportedVersion {
                found: u64::from(other),
                supported: CURRENT_VERSION,
            })
        }
    };

    let envelope = WireEnvelope {
        kind: PAYLOAD_TYPE,
        version: payload.version,
        self_key: payload.self_key.to_base64(),
        counterparty_key: payload.counterparty_key.to_base64(),
        safety_number,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Parse and validate a scanned payload. The input is untrusted.
pub fn decode(raw: &str) -> Result<VerificationPayload, CryptoError> {
    if raw.len() > MAX_PAYLOAD_LEN {
        return Err(CryptoError::MalformedPayload(format!(
            "payload exceeds {MAX_PAYLOAD_LEN} bytes"
        )));
    }

    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| CryptoError::MalformedPayload(format!("not JSON: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| CryptoError::MalformedPayload("expected a JSON object".into()))?;

    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| CryptoError::MalformedPayload("missing type".into()))?;
    if kind != PAYLOAD_TYPE {
        return Err(CryptoError::TypeMismatch(kind.to_owned()));
    }

    let version = obj
        .get("version")
        .and_then(Value::as_u64)
        .ok_or_else(|| CryptoError::MalformedPayload("missing or non-integer version".into()))?;
    if version < u64::from(OLDEST_VERSION) {
        return Err(CryptoError::MalformedPayload(format!(
            "invalid version {version}"
        )));
    }
    if version > u64::from(CURRENT_VERSION) {
        return Err(CryptoError::UnsupportedVersion {
            found: version,
            supported: CURRENT_VERSION,
        });
    }

    let field = |name: &str| {
        obj.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| CryptoError::MalformedPayload(format!("missing {name}")))
    };
    let key_field = |name: &str| {
        PublicKey::from_base64(field(name)?)
            .map_err(|e| CryptoError::MalformedPayload(format!("{name}: {e}")))
    };

    Ok(VerificationPayload {
        // bounded by CURRENT_VERSION above
        version: version as u32,
        self_key: key_field("self_key")?,
        counterparty_key: key_field("counterparty_key")?,
        safety_number: field("safety_number")?.parse()?,
    })
}
