//! Checking a scanned verification code against locally known keys.
//!
//! The matcher is a small state machine driven by the UI:
//!
//! ```text
//! Idle --open_scanner--> Scanning --submit_scan--> Comparing --> Accepted
//!  ^                        |                          |
//!  +--------cancel----------+                          +------> Rejected(reason)
//! ```
//!
//! `Comparing` is transient: `submit_scan` settles on a terminal state before
//! it returns. Terminal states only leave through [`ChallengeMatcher::reset`].

use crate::error::CryptoError;
use crate::fingerprint::safety_number_for;
use crate::key_bundle::PublicKey;
use crate::payload;

/// Why a scanned code was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The scan could not be decoded as a verification payload.
    Undecodable,
    /// The code was presented with a key other than the one on file for
    /// the counterparty.
    PresenterKeyMismatch,
    /// The presenter holds a different key for us than our own.
    OwnKeyMismatch,
    SafetyNumberMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    Idle,
    Scanning,
    Comparing,
    Accepted,
    Rejected(RejectReason),
}

impl MatchState {
    fn name(&self) -> &'static str {
        match self {
            MatchState::Idle => "idle",
            MatchState::Scanning => "scanning",
            MatchState::Comparing => "comparing",
            MatchState::Accepted => "accepted",
            MatchState::Rejected(_) => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchState::Accepted | MatchState::Rejected(_))
    }
}

/// Outcome of a completed comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

/// The keys a scanned code must agree with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedKeys {
    /// This device's identity key.
    pub own: PublicKey,
    /// The counterparty key on file.
    pub counterparty: PublicKey,
}

#[derive(Debug)]
pub struct ChallengeMatcher {
    state: MatchState,
}

impl Default for ChallengeMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeMatcher {
    pub fn new() -> Self {
        Self {
            state: MatchState::Idle,
        }
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    fn refuse(&self, action: &'static str) -> CryptoError {
        CryptoError::InvalidTransition {
            from: self.state.name(),
            action,
        }
    }

    pub fn open_scanner(&mut self) -> Result<(), CryptoError> {
        match self.state {
            MatchState::Idle => {
                self.state = MatchState::Scanning;
                Ok(())
            }
            _ => Err(self.refuse("open scanner")),
        }
    }

    /// Abandon the attempt before a comparison starts.
    pub fn cancel(&mut self) -> Result<(), CryptoError> {
        match self.state {
            MatchState::Idle | MatchState::Scanning => {
                self.state = MatchState::Idle;
                Ok(())
            }
            _ => Err(self.refuse("cancel")),
        }
    }

    /// Return from a terminal state to `Idle` so the user can try again.
    pub fn reset(&mut self) -> Result<(), CryptoError> {
        if !self.state.is_terminal() {
            return Err(self.refuse("reset"));
        }
        self.state = MatchState::Idle;
        Ok(())
    }

    /// Decode the scanned text and compare it with `expected`.
    ///
    /// Undecodable input moves to `Rejected(Undecodable)` and returns the
    /// decode error so the caller can tell the user what went wrong. A
    /// decodable code that does not match is `Ok(Verdict::Rejected(_))`.
    pub fn submit_scan(&mut self, raw: &str, expected: &ExpectedKeys) -> Result<Verdict, CryptoError> {
        if self.state != MatchState::Scanning {
            return Err(self.refuse("submit scan"));
        }

        let scanned = match payload::decode(raw) {
            Ok(scanned) => scanned,
            Err(e) => {
                tracing::warn!(error = %e, "scanned code could not be decoded");
                self.state = MatchState::Rejected(RejectReason::Undecodable);
                return Err(e);
            }
        };
        self.state = MatchState::Comparing;

        let verdict = if !scanned.self_key.ct_eq(&expected.counterparty) {
            Verdict::Rejected(RejectReason::PresenterKeyMismatch)
        } else if !scanned.counterparty_key.ct_eq(&expected.own) {
            Verdict::Rejected(RejectReason::OwnKeyMismatch)
        } else if !scanned
            .safety_number
            .ct_eq(&safety_number_for(&expected.own, &expected.counterparty))
        {
            Verdict::Rejected(RejectReason::SafetyNumberMismatch)
        } else {
            Verdict::Accepted
        };

        self.state = match verdict {
            Verdict::Accepted => MatchState::Accepted,
            Verdict::Rejected(reason) => {
                tracing::warn!(?reason, version = scanned.version, "verification code rejected");
                MatchState::Rejected(reason)
            }
        };
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::SafetyNumber;
    use crate::payload::{encode, VerificationPayload};
    use keyproof_shared::constants::PUBLIC_KEY_LEN;

    fn key(b: u8) -> PublicKey {
        PublicKey::from_bytes([b; PUBLIC_KEY_LEN])
    }

    /// Scanner is `me` (key 1), presenter is `them` (key 2).
    fn expected() -> ExpectedKeys {
        ExpectedKeys {
            own: key(1),
            counterparty: key(2),
        }
    }

    fn presented_code() -> String {
        encode(&VerificationPayload::for_keys(key(2), key(1))).unwrap()
    }

    fn scanning() -> ChallengeMatcher {
        let mut matcher = ChallengeMatcher::new();
        matcher.open_scanner().unwrap();
        matcher
    }

    #[test]
    fn starts_idle() {
        assert_eq!(ChallengeMatcher::new().state(), MatchState::Idle);
        assert_eq!(ChallengeMatcher::default().state(), MatchState::Idle);
    }

    #[test]
    fn matching_code_is_accepted() {
        let mut matcher = scanning();
        let verdict = matcher.submit_scan(&presented_code(), &expected()).unwrap();
        assert_eq!(verdict, Verdict::Accepted);
        assert_eq!(matcher.state(), MatchState::Accepted);
    }

    #[test]
    fn legacy_version_code_is_accepted() {
        let mut payload = VerificationPayload::for_keys(key(2), key(1));
        payload.version = 1;
        let mut matcher = scanning();
        let verdict = matcher.submit_scan(&encode(&payload).unwrap(), &expected()).unwrap();
        assert_eq!(verdict, Verdict::Accepted);
    }

    #[test]
    fn garbage_is_rejected_as_undecodable_with_error() {
        let mut matcher = scanning();
        let err = matcher.submit_scan("not a code", &expected()).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedPayload(_)));
        assert_eq!(matcher.state(), MatchState::Rejected(RejectReason::Undecodable));
    }

    #[test]
    fn future_version_is_undecodable() {
        let raw = presented_code().replace("\"version\":2", "\"version\":9");
        let mut matcher = scanning();
        let err = matcher.submit_scan(&raw, &expected()).unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedVersion { found: 9, .. }));
        assert_eq!(matcher.state(), MatchState::Rejected(RejectReason::Undecodable));
    }

    #[test]
    fn substituted_presenter_key_is_rejected_even_with_matching_number() {
        // Attacker presents their own key 9 but copies the genuine safety number.
        let genuine = VerificationPayload::for_keys(key(2), key(1));
        let forged = VerificationPayload {
            self_key: key(9),
            ..genuine
        };
        let mut matcher = scanning();
        let verdict = matcher.submit_scan(&encode(&forged).unwrap(), &expected()).unwrap();
        assert_eq!(verdict, Verdict::Rejected(RejectReason::PresenterKeyMismatch));
    }

    #[test]
    fn presenter_holding_wrong_key_for_us_is_rejected() {
        // genuine presenter key and safety number, but the wrong key for us
        let payload = VerificationPayload {
            version: crate::payload::CURRENT_VERSION,
            self_key: key(2),
            counterparty_key: key(8),
            safety_number: safety_number_for(&key(1), &key(2)),
        };
        let mut matcher = scanning();
        let verdict = matcher.submit_scan(&encode(&payload).unwrap(), &expected()).unwrap();
        assert_eq!(verdict, Verdict::Rejected(RejectReason::OwnKeyMismatch));
        assert_eq!(
            matcher.state(),
            MatchState::Rejected(RejectReason::OwnKeyMismatch)
        );
    }

    #[test]
    fn wrong_safety_number_is_rejected() {
        let mut payload = VerificationPayload::for_keys(key(2), key(1));
        payload.safety_number = "0".repeat(60).parse::<SafetyNumber>().unwrap();
        let mut matcher = scanning();
        let verdict = matcher.submit_scan(&encode(&payload).unwrap(), &expected()).unwrap();
        assert_eq!(verdict, Verdict::Rejected(RejectReason::SafetyNumberMismatch));
    }

    #[test]
    fn scan_outside_scanning_is_invalid_transition() {
        let mut matcher = ChallengeMatcher::new();
        let err = matcher.submit_scan(&presented_code(), &expected()).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidTransition { from: "idle", action: "submit scan" }
        ));

        let mut done = scanning();
        done.submit_scan(&presented_code(), &expected()).unwrap();
        assert!(done.submit_scan(&presented_code(), &expected()).is_err());
        assert_eq!(done.state(), MatchState::Accepted);
    }

    #[test]
    fn cancel_from_idle_and_scanning_returns_to_idle() {
        let mut matcher = ChallengeMatcher::new();
        matcher.cancel().unwrap();
        assert_eq!(matcher.state(), MatchState::Idle);

        matcher.open_scanner().unwrap();
        matcher.cancel().unwrap();
        assert_eq!(matcher.state(), MatchState::Idle);
        matcher.open_scanner().unwrap();
    }

    #[test]
    fn cancel_after_comparison_is_refused() {
        let mut matcher = scanning();
        matcher.submit_scan(&presented_code(), &expected()).unwrap();
        assert!(matches!(
            matcher.cancel(),
            Err(CryptoError::InvalidTransition { from: "accepted", .. })
        ));
    }

    #[test]
    fn open_scanner_twice_is_refused() {
        let mut matcher = scanning();
        assert!(matcher.open_scanner().is_err());
        assert_eq!(matcher.state(), MatchState::Scanning);
    }

    #[test]
    fn reset_only_from_terminal_states() {
        let mut matcher = ChallengeMatcher::new();
        assert!(matcher.reset().is_err());
        matcher.open_scanner().unwrap();
        assert!(matcher.reset().is_err());

        let _ = matcher.submit_scan("{}", &expected());
        assert!(matcher.state().is_terminal());
        matcher.reset().unwrap();
        assert_eq!(matcher.state(), MatchState::Idle);

        matcher.open_scanner().unwrap();
        assert_eq!(
            matcher.submit_scan(&presented_code(), &expected()).unwrap(),
            Verdict::Accepted
        );
    }
}
