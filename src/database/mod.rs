//! Realtime Database over its REST interface: immutable references and
//! queries, one-shot reads and writes, and snapshots of the returned JSON.

pub mod path;
pub mod query;
mod reader;
pub mod reference;
pub mod snapshot;

use crate::core::middleware::TokenSource;
use crate::core::{is_transient_middleware, is_transient_request, is_transient_status};
use reqwest_middleware::ClientWithMiddleware;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

pub use query::QueryParams;
pub use reference::Reference;
pub use snapshot::DataSnapshot;

#[cfg(test)]
mod tests;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid database URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Failed to get access token: {0}")]
    TokenError(String),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

impl DatabaseError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DatabaseError::RequestError(e) => is_transient_request(e),
            DatabaseError::MiddlewareError(e) => is_transient_middleware(e),
            DatabaseError::ApiError { status, .. } => is_transient_status(*status),
            _ => false,
        }
    }
}

/// Server-side value placeholders.
pub struct ServerValue;

impl ServerValue {
    /// Resolved by the server to its current time in milliseconds.
    pub fn timestamp() -> Value {
        serde_json::json!({ ".sv": "timestamp" })
    }
}

struct DatabaseInner {
    client: ClientWithMiddleware,
    base_url: String,
    token_source: Option<Arc<dyn TokenSource>>,
}

/// Handle to one database instance. Clones refer to the same instance.
#[derive(Clone)]
pub struct FirebaseDatabase {
    inner: Arc<DatabaseInner>,
}

impl FirebaseDatabase {
    pub fn new(
        client: ClientWithMiddleware,
        base_url: &str,
        token_source: Option<Arc<dyn TokenSource>>,
    ) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                token_source,
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Reference to `path`, normalized.
    pub fn reference(&self, path: &str) -> Reference {
        Reference::new(self.clone(), path::normalize(path))
    }

    pub fn root(&self) -> Reference {
        Reference::new(self.clone(), String::new())
    }

    /// Connection management only makes sense for a streaming client.
    pub fn go_online(&self) -> Result<(), DatabaseError> {
        Err(DatabaseError::NotImplemented("go_online"))
    }

    pub fn go_offline(&self) -> Result<(), DatabaseError> {
        Err(DatabaseError::NotImplemented("go_offline"))
    }

    pub(crate) fn same_instance(&self, other: &FirebaseDatabase) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn client(&self) -> &ClientWithMiddleware {
        &self.inner.client
    }

    pub(crate) fn location(&self, path: &str) -> String {
        format!("{}/{}", self.inner.base_url, path)
    }

    /// REST URL for `path` with the given query parameters and, when the app
    /// holds credentials, an `access_token` parameter.
    pub(crate) async fn rest_url(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Url, DatabaseError> {
        let mut url = Url::parse(&self.inner.base_url)?;
        {
            // One segment per key; `?`, `#`, `%` and friends are percent-encoded.
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            segments.pop_if_empty();
            let keys: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            match keys.split_last() {
                Some((last, parents)) => {
                    segments.extend(parents);
                    segments.push(&format!("{}.json", last));
                }
                None => {
                    segments.push(".json");
                }
            }
        }

        let token = match &self.inner.token_source {
            Some(source) => Some(
                source
                    .access_token()
                    .await
                    .map_err(|e| DatabaseError::TokenError(e.to_string()))?,
            ),
            None => None,
        };

        if !params.is_empty() || token.is_some() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
            if let Some(token) = &token {
                pairs.append_pair("access_token", token);
            }
        }

        Ok(url)
    }
}
