use chrono::{DateTime, Utc};
use jsonwebtoken::DecodingKey;
use reqwest::{header, Client};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const GOOGLE_PUBLIC_KEYS_URL: &str =
    "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";

#[derive(Error, Debug)]
pub enum KeyFetchError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Key endpoint returned {0}")]
    Status(reqwest::StatusCode),
    #[error("Missing or malformed Expires header")]
    InvalidExpires,
    #[error("Failed to parse keys: {0}")]
    ParseError(#[from] serde_json::Error),
}

#[derive(Default)]
struct CachedKeys {
    keys: HashMap<String, DecodingKey>,
    expires_at: Option<DateTime<Utc>>,
}

impl CachedKeys {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        !self.keys.is_empty() && self.expires_at.is_some_and(|at| now < at)
    }
}

/// Caches Google's token-signing public keys until the `Expires` time the
/// key endpoint advertises.
pub struct PublicKeyManager {
    client: Client,
    url: String,
    cache: RwLock<CachedKeys>,
}

impl PublicKeyManager {
    pub fn new(client: Client) -> Self {
        Self::with_url(client, GOOGLE_PUBLIC_KEYS_URL)
    }

    pub fn with_url(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            cache: RwLock::new(CachedKeys::default()),
        }
    }

    /// Returns the key for `kid`, refreshing first when the cache is stale.
    /// A failed refresh is logged and reported as "no key".
    pub async fn select_key(&self, kid: &str) -> Option<DecodingKey> {
        {
            let cache = self.cache.read().await;
            if cache.is_fresh(Utc::now()) {
                return cache.keys.get(kid).cloned();
            }
        }

        if let Err(err) = self.refresh_keys().await {
            warn!(error = %err, "failed to refresh token signing keys");
            return None;
        }

        self.cache.read().await.keys.get(kid).cloned()
    }

    async fn refresh_keys(&self) -> Result<(), KeyFetchError> {
        let mut cache = self.cache.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if cache.is_fresh(Utc::now()) {
            return Ok(());
        }

        debug!(url = %self.url, "fetching token signing keys");
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(KeyFetchError::Status(response.status()));
        }

        let expires_at = response
            .headers()
            .get(header::EXPIRES)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .ok_or(KeyFetchError::InvalidExpires)?;

        let body = response.bytes().await?;
        let pems: HashMap<String, String> = serde_json::from_slice(&body)?;

        let mut keys = HashMap::with_capacity(pems.len());
        for (kid, pem) in pems {
            match DecodingKey::from_rsa_pem(pem.as_bytes()) {
                Ok(key) => {
                    keys.insert(kid, key);
                }
                Err(err) => warn!(%kid, error = %err, "skipping unparseable public key"),
            }
        }

        debug!(count = keys.len(), %expires_at, "token signing keys refreshed");
        *cache = CachedKeys {
            keys,
            expires_at: Some(expires_at),
        };
        Ok(())
    }
}
