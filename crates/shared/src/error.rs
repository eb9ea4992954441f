/// Shared error type used by the key directory and its clients.
#[derive(Debug, thiserror::Error)]
pub enum KeyproofError {
    #[error("not found")]
    NotFound,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("crypto error: {0}")]
    Crypto(String),
}
