use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use dashmap::mapref::entry::Entry;
use keyproof_shared::api::keys::{KeyBundleResponse, PublishKeysRequest};
use keyproof_shared::error::KeyproofError;

use crate::error::ServerError;
use crate::state::DirectoryState;
use crate::validation::{parse_user_id, validate_public_key};

/// GET /api/users/{user_id}/keys: the user's current identity key bundle.
pub async fn get_keys(
    State(state): State<DirectoryState>,
    Path(user_id): Path<String>,
) -> Result<Json<KeyBundleResponse>, ServerError> {
    let user_id = parse_user_id(&user_id)?;
    let bundle = state
        .bundles
        .get(&user_id)
        .map(|bundle| bundle.clone())
        .ok_or(ServerError(KeyproofError::NotFound))?;
    tracing::debug!(%user_id, key_id = %bundle.key_id, "served key bundle");
    Ok(Json(bundle))
}

/// PUT /api/users/{user_id}/keys: publish or rotate the user's identity key.
///
/// Bundles are immutable per key id: republishing an existing key id is
/// accepted only if the key is identical.
pub async fn publish_keys(
    State(state): State<DirectoryState>,
    Path(user_id): Path<String>,
    Json(req): Json<PublishKeysRequest>,
) -> Result<(StatusCode, Json<KeyBundleResponse>), ServerError> {
    let user_id = parse_user_id(&user_id)?;
    let public_key = validate_public_key(&req.public_key)?;

    let bundle = match state.bundles.entry(user_id) {
        Entry::Occupied(mut slot) => {
            let current = slot.get();
            if current.key_id == req.key_id {
                if current.public_key != public_key {
                    return Err(KeyproofError::Conflict(format!(
                        "key id {} is already published with a different key",
                        req.key_id
                    ))
                    .into());
                }
                current.clone()
            } else {
                tracing::info!(%user_id, old_key_id = %current.key_id, new_key_id = %req.key_id, "identity key rotated");
                let bundle = new_bundle(user_id, public_key, req.key_id);
                slot.insert(bundle.clone());
                bundle
            }
        }
        Entry::Vacant(slot) => {
            tracing::info!(%user_id, key_id = %req.key_id, "identity key published");
            let bundle = new_bundle(user_id, public_key, req.key_id);
            slot.insert(bundle.clone());
            bundle
        }
    };

    Ok((StatusCode::CREATED, Json(bundle)))
}

fn new_bundle(
    user_id: keyproof_shared::ids::UserId,
    public_key: String,
    key_id: keyproof_shared::ids::KeyId,
) -> KeyBundleResponse {
    KeyBundleResponse {
        user_id,
        public_key,
        key_id,
        created_at: chrono::Utc::now(),
    }
}
