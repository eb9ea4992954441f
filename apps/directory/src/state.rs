use std::sync::Arc;

use dashmap::DashMap;
use keyproof_shared::api::keys::KeyBundleResponse;
use keyproof_shared::ids::UserId;

use crate::config::DirectoryConfig;

/// Shared application state passed to all handlers via Axum's State extractor.
///
/// Both fields are `Arc`-wrapped so cloning per request is cheap.
#[derive(Clone)]
pub struct DirectoryState {
    /// The current bundle per user. Publishing a new key id replaces it.
    pub bundles: Arc<DashMap<UserId, KeyBundleResponse>>,
    pub config: Arc<DirectoryConfig>,
}

impl DirectoryState {
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            bundles: Arc::new(DashMap::new()),
            config: Arc::new(config),
        }
    }
}
