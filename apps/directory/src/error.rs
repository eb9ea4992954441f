use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use keyproof_shared::error::KeyproofError;

/// Newtype wrapper for `KeyproofError` that implements `IntoResponse`.
///
/// Needed because of the orphan rule: neither the trait nor the error type is
/// defined in this crate.
#[derive(Debug)]
pub struct ServerError(pub KeyproofError);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            KeyproofError::NotFound => (StatusCode::NOT_FOUND, self.0.to_string()),
            KeyproofError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            KeyproofError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            KeyproofError::Internal(msg) | KeyproofError::Crypto(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<KeyproofError> for ServerError {
    fn from(e: KeyproofError) -> Self {
        ServerError(e)
    }
}
