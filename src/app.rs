//! Application context: resolves credentials, project id and service URLs once
//! and hands out service clients that share them.

use crate::core::build_http_client;
use crate::core::middleware::AuthMiddleware;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use yup_oauth2::ServiceAccountKey;

#[cfg(feature = "auth")]
use crate::auth::{token::ServiceAccountSigner, FirebaseAuth};
#[cfg(feature = "database")]
use crate::database::FirebaseDatabase;
#[cfg(feature = "messaging")]
use crate::messaging::FirebaseMessaging;

pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
const PROJECT_ENV_VARS: [&str; 2] = ["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"];
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid service account credentials: {0}")]
    InvalidCredentials(#[source] std::io::Error),
    #[error("Failed to read credentials file {path}: {source}")]
    CredentialsFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid service account private key: {0}")]
    InvalidPrivateKey(#[from] jsonwebtoken::errors::Error),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Options used to initialize a [`FirebaseApp`].
///
/// Everything is optional; missing values are filled from the service account
/// key and the environment during [`FirebaseApp::initialize`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppOptions {
    pub project_id: Option<String>,
    pub service_account: Option<ServiceAccountKey>,
    pub database_url: Option<String>,
    pub api_key: Option<String>,
    #[serde(skip)]
    pub http_timeout: Option<Duration>,
}

impl AppOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_service_account(mut self, key: ServiceAccountKey) -> Self {
        self.service_account = Some(key);
        self
    }

    /// Parses inline service-account JSON.
    pub fn with_service_account_json(mut self, json: impl AsRef<[u8]>) -> Result<Self, AppError> {
        let key = yup_oauth2::parse_service_account_key(json).map_err(AppError::InvalidCredentials)?;
        self.service_account = Some(key);
        Ok(self)
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }
}

/// Credentials resolved from [`AppOptions`] and the environment.
pub(crate) struct Credentials {
    pub(crate) key: Option<ServiceAccountKey>,
    pub(crate) project_id: String,
}

impl Credentials {
    /// Inline JSON wins, then the file named by `GOOGLE_APPLICATION_CREDENTIALS`.
    /// Without either the app still works for unauthenticated calls.
    pub(crate) async fn resolve(options: &AppOptions) -> Result<Self, AppError> {
        let key = match &options.service_account {
            Some(key) => Some(key.clone()),
            None => match std::env::var(CREDENTIALS_ENV) {
                Ok(path) if !path.is_empty() => {
                    debug!(%path, "loading service account from environment");
                    let key = yup_oauth2::read_service_account_key(&path)
                        .await
                        .map_err(|source| AppError::CredentialsFile { path, source })?;
                    Some(key)
                }
                _ => None,
            },
        };
        Ok(Self::from_key(key, options))
    }

    pub(crate) fn from_key(key: Option<ServiceAccountKey>, options: &AppOptions) -> Self {
        let project_id = options
            .project_id
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(|| key.as_ref().and_then(|k| k.project_id.clone()))
            .or_else(|| {
                PROJECT_ENV_VARS
                    .iter()
                    .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            })
            .unwrap_or_default();
        Self { key, project_id }
    }
}

struct AppInner {
    project_id: String,
    database_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
    token_source: Option<AuthMiddleware>,
    #[cfg(feature = "auth")]
    signer: Option<Arc<ServiceAccountSigner>>,
}

/// An initialized Firebase application. Cheap to clone.
#[derive(Clone)]
pub struct FirebaseApp {
    inner: Arc<AppInner>,
}

impl FirebaseApp {
    /// Resolves credentials (inline key, then `GOOGLE_APPLICATION_CREDENTIALS`)
    /// and builds the shared HTTP client.
    pub async fn initialize(options: AppOptions) -> Result<Self, AppError> {
        let credentials = Credentials::resolve(&options).await?;
        Self::from_credentials(credentials, &options)
    }

    /// Builds an app straight from a service account key without touching the environment.
    pub fn new(service_account_key: ServiceAccountKey) -> Result<Self, AppError> {
        let options = AppOptions::default();
        Self::from_credentials(Credentials::from_key(Some(service_account_key), &options), &options)
    }

    fn from_credentials(credentials: Credentials, options: &AppOptions) -> Result<Self, AppError> {
        let Credentials { key, project_id } = credentials;

        #[cfg(feature = "auth")]
        let signer = key
            .as_ref()
            .map(ServiceAccountSigner::from_key)
            .transpose()?
            .map(Arc::new);

        let database_url = options
            .database_url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("https://{}.firebaseio.com", project_id));

        let http = build_http_client(options.http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT))?;

        info!(
            project_id = %project_id,
            authenticated = key.is_some(),
            "initialized firebase app"
        );

        Ok(Self {
            inner: Arc::new(AppInner {
                project_id,
                database_url,
                api_key: options.api_key.clone(),
                http,
                token_source: key.map(AuthMiddleware::new),
                #[cfg(feature = "auth")]
                signer,
            }),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.inner.project_id
    }

    pub fn database_url(&self) -> &str {
        &self.inner.database_url
    }

    pub fn has_credentials(&self) -> bool {
        self.inner.token_source.is_some()
    }

    fn client(&self) -> reqwest_middleware::ClientWithMiddleware {
        let builder = reqwest_middleware::ClientBuilder::new(self.inner.http.clone());
        match &self.inner.token_source {
            Some(middleware) => builder.with(middleware.clone()).build(),
            None => builder.build(),
        }
    }

    /// Identity Toolkit client. Each handle owns its own public key cache;
    /// keep and clone a handle to share it.
    #[cfg(feature = "auth")]
    pub fn auth(&self) -> FirebaseAuth {
        FirebaseAuth::new(
            self.client(),
            self.inner.http.clone(),
            self.inner.project_id.clone(),
            self.inner.signer.clone(),
        )
    }

    #[cfg(feature = "database")]
    pub fn database(&self) -> FirebaseDatabase {
        let token_source = self
            .inner
            .token_source
            .clone()
            .map(|m| Arc::new(m) as Arc<dyn crate::core::middleware::TokenSource>);
        FirebaseDatabase::new(
            reqwest_middleware::ClientBuilder::new(self.inner.http.clone()).build(),
            &self.inner.database_url,
            token_source,
        )
    }

    #[cfg(feature = "messaging")]
    pub fn messaging(&self) -> FirebaseMessaging {
        FirebaseMessaging::new(
            reqwest_middleware::ClientBuilder::new(self.inner.http.clone()).build(),
            self.inner.api_key.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{service_account_json, service_account_key, PROJECT_ID};

    #[test]
    fn test_project_id_prefers_options() {
        let options = AppOptions::new().with_project_id("explicit");
        let creds = Credentials::from_key(Some(service_account_key()), &options);
        assert_eq!(creds.project_id, "explicit");
    }

    #[test]
    fn test_project_id_falls_back_to_key() {
        let creds = Credentials::from_key(Some(service_account_key()), &AppOptions::default());
        assert_eq!(creds.project_id, PROJECT_ID);
    }

    #[tokio::test]
    async fn test_initialize_with_inline_json() {
        let options = AppOptions::new()
            .with_service_account_json(service_account_json())
            .unwrap();
        let app = FirebaseApp::initialize(options).await.unwrap();

        assert_eq!(app.project_id(), PROJECT_ID);
        assert_eq!(app.database_url(), "https://mock-project-id.firebaseio.com");
        assert!(app.has_credentials());
    }

    #[tokio::test]
    async fn test_explicit_database_url() {
        let options = AppOptions::new()
            .with_service_account(service_account_key())
            .with_database_url("https://custom.example.com");
        let app = FirebaseApp::initialize(options).await.unwrap();
        assert_eq!(app.database_url(), "https://custom.example.com");
    }

    #[test]
    fn test_invalid_inline_json() {
        let result = AppOptions::new().with_service_account_json("{not json");
        assert!(matches!(result, Err(AppError::InvalidCredentials(_))));
    }

    #[test]
    fn test_options_deserialize_camel_case() {
        let options: AppOptions = serde_json::from_str(
            r#"{"projectId":"p","databaseUrl":"https://p.firebaseio.com","apiKey":"k"}"#,
        )
        .unwrap();
        assert_eq!(options.project_id.as_deref(), Some("p"));
        assert_eq!(options.database_url.as_deref(), Some("https://p.firebaseio.com"));
        assert_eq!(options.api_key.as_deref(), Some("k"));
    }
}
