/// Length in bytes of an X25519 identity public key.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Number of decimal digits in a safety number.
pub const SAFETY_NUMBER_DIGITS: usize = 60;
/// Digits per display group of a safety number.
pub const SAFETY_NUMBER_GROUP_LEN: usize = 5;
/// Upper bound on a scanned verification payload, in bytes.
pub const MAX_PAYLOAD_LEN: usize = 1024;
