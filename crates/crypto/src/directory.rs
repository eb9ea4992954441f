//! Fetching counterparties' published key bundles from the key directory.

use std::time::Duration;

use async_trait::async_trait;
use keyproof_shared::api::keys::KeyBundleResponse;
use keyproof_shared::ids::UserId;
use reqwest::{Client, StatusCode};

use crate::config::ClientConfig;
use crate::error::CryptoError;
use crate::key_bundle::{KeyBundle, Owner};

/// Read access to published key bundles.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// The bundle currently published by `user_id`.
    ///
    /// `NoPublishedKeys` when the user never set up encryption,
    /// `RemoteLookupFailed` when the directory could not answer.
    async fn fetch_bundle(&self, user_id: &UserId) -> Result<KeyBundle, CryptoError>;
}

/// Turn a non-success response into a lookup failure, preferring the
/// server's `{"error": ...}` message when it sent one.
async fn error_from_response(resp: reqwest::Response, context: &str) -> CryptoError {
    #[derive(serde::Deserialize)]
    struct ServerError {
        error: String,
    }
    let status = resp.status();
    match resp.json::<ServerError>().await {
        Ok(body) => CryptoError::RemoteLookupFailed(format!("{context}: {}", body.error)),
        Err(_) => CryptoError::RemoteLookupFailed(format!("{context} (HTTP {status})")),
    }
}

fn transport_error(e: reqwest::Error) -> CryptoError {
    if e.is_timeout() {
        CryptoError::RemoteLookupFailed("request timed out".into())
    } else if e.is_connect() {
        CryptoError::RemoteLookupFailed("could not connect to key directory".into())
    } else {
        CryptoError::RemoteLookupFailed(format!("key directory request failed: {e}"))
    }
}

/// HTTP client for the keyproof directory API.
#[derive(Debug, Clone)]
pub struct HttpKeyDirectory {
    base_url: String,
    http_client: Client,
}

impl HttpKeyDirectory {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, CryptoError> {
        let http_client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| CryptoError::RemoteLookupFailed(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            http_client,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, CryptoError> {
        Self::new(
            config.directory_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_secs(config.connect_timeout_secs),
        )
    }

    fn keys_url(&self, user_id: &UserId) -> String {
        format!("{}/api/users/{user_id}/keys", self.base_url)
    }

    /// Publish `bundle` as `user_id`'s current identity.
    ///
    /// Publishing a new key id replaces the previous bundle. Reusing a key id
    /// with different key bytes is refused by the directory.
    pub async fn publish_bundle(&self, user_id: &UserId, bundle: &KeyBundle) -> Result<(), CryptoError> {
        let resp = self
            .http_client
            .put(self.keys_url(user_id))
            .json(&bundle.to_publish_request())
            .send()
            .await
            .map_err(transport_error)?;

        if !resp.status().is_success() {
            return Err(error_from_response(resp, "publishing keys failed").await);
        }
        tracing::info!(%user_id, key_id = %bundle.key_id(), "published key bundle");
        Ok(())
    }
}

#[async_trait]
impl KeyDirectory for HttpKeyDirectory {
    async fn fetch_bundle(&self, user_id: &UserId) -> Result<KeyBundle, CryptoError> {
        tracing::debug!(%user_id, "fetching key bundle");
        let resp = self
            .http_client
            .get(self.keys_url(user_id))
            .send()
            .await
            .map_err(transport_error)?;

        match resp.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(CryptoError::NoPublishedKeys { user_id: *user_id }),
            _ => return Err(error_from_response(resp, "key lookup failed").await),
        }

        let body: KeyBundleResponse = resp.json().await.map_err(|e| {
            CryptoError::RemoteLookupFailed(format!("invalid key bundle response: {e}"))
        })?;
        if body.user_id != *user_id {
            return Err(CryptoError::RemoteLookupFailed(format!(
                "directory answered for {} when asked for {user_id}",
                body.user_id
            )));
        }
        KeyBundle::from_response(&body)
            .map_err(|e| CryptoError::RemoteLookupFailed(format!("directory served a bad key: {e}")))
    }
}

/// Bounds every directory lookup by a deadline.
pub struct KeyBundleFetcher<D> {
    directory: D,
    timeout: Duration,
}

impl<D: KeyDirectory> KeyBundleFetcher<D> {
    pub fn new(directory: D, timeout: Duration) -> Self {
        Self { directory, timeout }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Fetch the counterparty's bundle. A missed deadline is `RemoteLookupFailed`.
    pub async fn fetch(&self, user_id: &UserId) -> Result<KeyBundle, CryptoError> {
        let bundle = tokio::time::timeout(self.timeout, self.directory.fetch_bundle(user_id))
            .await
            .map_err(|_| {
                CryptoError::RemoteLookupFailed(format!(
                    "key lookup for {user_id} timed out after {:?}",
                    self.timeout
                ))
            })??;

        if bundle.owner() != Owner::Remote(*user_id) {
            return Err(CryptoError::RemoteLookupFailed(format!(
                "directory returned a bundle not owned by {user_id}"
            )));
        }
        Ok(bundle)
    }
}
