// src/client.rs

use crate::config::HttpSettings;
use crate::error::UserPoolJwtError;
use crate::model::{JsonWebKey, JsonWebKeySet};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Builds the HTTP client shared by the JWKS fetch and the code exchange.
pub(crate) fn build_http_client(settings: &HttpSettings) -> Result<reqwest::Client, UserPoolJwtError> {
    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .timeout(settings.request_timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(UserPoolJwtError::HttpClient)
}

/// A client for fetching JSON Web Key Sets and selecting a key by `kid`.
///
/// By default every lookup fetches the set fresh. With a cache TTL the set
/// is kept per JWKS URL; a cached set that lacks the requested `kid` is
/// considered stale and refetched once, so provider key rotation is picked
/// up without waiting for the TTL.
#[derive(Clone)]
pub struct JwksClient {
    // The client is internally ref-counted to allow for cheap cloning.
    inner: Arc<Inner>,
}

struct Inner {
    http_client: reqwest::Client,
    // Cache stores `jwks_uri` -> key set.
    key_cache: Option<Cache<String, Arc<JsonWebKeySet>>>,
}

impl JwksClient {
    /// Creates a new `JwksClient` on top of an existing HTTP client.
    pub fn new(http_client: reqwest::Client, cache_ttl: Option<Duration>) -> Self {
        let key_cache = cache_ttl.map(|ttl| Cache::builder().max_capacity(16).time_to_live(ttl).build());
        Self {
            inner: Arc::new(Inner {
                http_client,
                key_cache,
            }),
        }
    }

    /// Retrieves the key whose `kid` matches exactly.
    ///
    /// # Errors
    ///
    /// `JwksFetchFailed`/`NetworkTimeout` if the set cannot be downloaded,
    /// `JwksParseFailed` if it is not a key set, `KeyNotFound` if no key matches.
    #[instrument(skip(self, jwks_uri), fields(jwks_uri = %jwks_uri), err)]
    pub async fn get_key(&self, jwks_uri: &Url, kid: &str) -> Result<JsonWebKey, UserPoolJwtError> {
        if let Some(cache) = &self.inner.key_cache {
            if let Some(jwks) = cache.get(jwks_uri.as_str()).await {
                if let Some(key) = jwks.find(kid) {
                    debug!("JWKS cache hit for kid: {}", kid);
                    return Ok(key.clone());
                }
                debug!("kid {} not in cached JWKS. Refetching from provider.", kid);
            }
        }

        let jwks = Arc::new(self.fetch_jwks(jwks_uri).await?);
        if let Some(cache) = &self.inner.key_cache {
            cache.insert(jwks_uri.to_string(), Arc::clone(&jwks)).await;
        }

        jwks.find(kid)
            .cloned()
            .ok_or_else(|| UserPoolJwtError::KeyNotFound(kid.to_string()))
    }

    /// Downloads and parses the key set. No retries are attempted.
    pub async fn fetch_jwks(&self, jwks_uri: &Url) -> Result<JsonWebKeySet, UserPoolJwtError> {
        debug!("Fetching JWKS from: {}", jwks_uri);
        let fetch_failed = |status: Option<u16>, detail: String| UserPoolJwtError::JwksFetchFailed {
            url: jwks_uri.to_string(),
            status,
            detail,
        };

        let response = self
            .inner
            .http_client
            .get(jwks_uri.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UserPoolJwtError::NetworkTimeout { url: jwks_uri.to_string() }
                } else {
                    fetch_failed(None, e.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                UserPoolJwtError::NetworkTimeout { url: jwks_uri.to_string() }
            } else {
                fetch_failed(Some(status.as_u16()), e.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(fetch_failed(Some(status.as_u16()), body));
        }

        let jwks: JsonWebKeySet =
            serde_json::from_str(&body).map_err(|e| UserPoolJwtError::JwksParseFailed(e.to_string()))?;
        debug!("Successfully fetched {} keys.", jwks.keys.len());
        Ok(jwks)
    }
}
