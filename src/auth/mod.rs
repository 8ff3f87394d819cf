//! Custom token minting, ID-token verification and user account management
//! over the Identity Toolkit relyingparty API.

pub mod keys;
pub mod models;
pub mod token;
pub mod verifier;

use crate::auth::keys::PublicKeyManager;
use crate::auth::models::{
    AssertionResult, AuthUri, CreateAuthUriRequest, CreateUserRequest,
    DeleteAccountRequest, DownloadAccountRequest, DownloadAccountResponse, GetAccountInfoRequest,
    GetAccountInfoResponse, ImportUserError, LocalIdResponse, OobCodeRequest, OobCodeResponse,
    SignupNewUserRequest, UpdateUserRequest, UploadAccountRequest, UploadAccountResponse,
    UploadAccountUser, UserRecord, VerifyAssertionRequest, VerifyPasswordRequest,
};
use crate::auth::token::ServiceAccountSigner;
use crate::auth::verifier::{IdTokenClaims, IdTokenVerifier};
use crate::core::{is_transient_middleware, is_transient_request, is_transient_status, parse_error_response};
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub use verifier::TokenError;


const RELYING_PARTY_URL: &str = "https://www.googleapis.com/identitytoolkit/v3/relyingparty";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("a service account is required to sign custom tokens")]
    ServiceAccountRequired,
    #[error("failed to sign custom token: {0}")]
    SigningError(#[source] jsonwebtoken::errors::Error),
    #[error("require user id")]
    UserIdRequired,
    #[error("User not found")]
    UserNotFound,
    #[error("create account error: no user id returned")]
    CreateAccountFailed,
    #[error("create user error: {0:?}")]
    ImportFailed(Vec<ImportUserError>),
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl AuthError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AuthError::RequestError(e) => is_transient_request(e),
            AuthError::MiddlewareError(e) => is_transient_middleware(e),
            AuthError::ApiError { status, .. } => is_transient_status(*status),
            _ => false,
        }
    }
}

/// Identity Toolkit client.
///
/// Clones share the public key cache used by [`verify_id_token`](Self::verify_id_token).
#[derive(Clone)]
pub struct FirebaseAuth {
    client: ClientWithMiddleware,
    base_url: String,
    project_id: String,
    signer: Option<Arc<ServiceAccountSigner>>,
    verifier: Arc<IdTokenVerifier>,
}

impl FirebaseAuth {
    pub fn new(
        client: ClientWithMiddleware,
        http: reqwest::Client,
        project_id: String,
        signer: Option<Arc<ServiceAccountSigner>>,
    ) -> Self {
        let keys = Arc::new(PublicKeyManager::new(http));
        Self::new_with_client(client, RELYING_PARTY_URL.to_string(), project_id, signer, keys)
    }

    pub(crate) fn new_with_client(
        client: ClientWithMiddleware,
        base_url: String,
        project_id: String,
        signer: Option<Arc<ServiceAccountSigner>>,
        keys: Arc<PublicKeyManager>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            verifier: Arc::new(IdTokenVerifier::new(project_id.clone(), keys)),
            project_id,
            signer,
        }
    }

    /// Returns a handle that tolerates `leeway` of clock skew on the
    /// issued-at check. The key cache stays shared.
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        let keys = Arc::clone(self.verifier.key_manager());
        self.verifier = Arc::new(IdTokenVerifier::new(self.project_id.clone(), keys).with_leeway(leeway));
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Mints a custom sign-in token for `uid`, valid for one hour.
    pub fn create_custom_token(&self, uid: &str) -> Result<String, AuthError> {
        self.sign_custom_token::<()>(uid, None)
    }

    /// Like [`create_custom_token`](Self::create_custom_token), embedding
    /// `claims` under the `claims` key of the payload.
    pub fn create_custom_token_with_claims<C: Serialize>(
        &self,
        uid: &str,
        claims: &C,
    ) -> Result<String, AuthError> {
        self.sign_custom_token(uid, Some(claims))
    }

    fn sign_custom_token<C: Serialize>(&self, uid: &str, claims: Option<&C>) -> Result<String, AuthError> {
        let signer = self.signer.as_ref().ok_or(AuthError::ServiceAccountRequired)?;
        let now = chrono::Utc::now().timestamp();
        signer.sign(uid, claims, now).map_err(AuthError::SigningError)
    }

    /// Verifies signature and claims of a Firebase ID token.
    pub async fn verify_id_token(&self, token: &str) -> Result<IdTokenClaims, AuthError> {
        Ok(self.verifier.verify_token(token).await?)
    }

    async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, AuthError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, method);
        debug!(method, "identity toolkit request");

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(request)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = parse_error_response(response, &format!("{} failed", method)).await;
            return Err(AuthError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    async fn get_account_info(&self, request: GetAccountInfoRequest) -> Result<Vec<UserRecord>, AuthError> {
        let result: GetAccountInfoResponse = self.call("getAccountInfo", &request).await?;
        Ok(result.users.into_iter().map(UserRecord::from).collect())
    }

    pub async fn get_user(&self, uid: &str) -> Result<UserRecord, AuthError> {
        self.get_users(&[uid])
            .await?
            .into_iter()
            .next()
            .ok_or(AuthError::UserNotFound)
    }

    /// Looks up several accounts at once. Unknown ids are simply absent.
    pub async fn get_users(&self, uids: &[&str]) -> Result<Vec<UserRecord>, AuthError> {
        self.get_account_info(GetAccountInfoRequest {
            local_id: Some(uids.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        })
        .await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<UserRecord, AuthError> {
        self.get_users_by_email(&[email])
            .await?
            .into_iter()
            .next()
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn get_users_by_email(&self, emails: &[&str]) -> Result<Vec<UserRecord>, AuthError> {
        self.get_account_info(GetAccountInfoRequest {
            email: Some(emails.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        })
        .await
    }

    pub async fn get_user_by_phone_number(&self, phone_number: &str) -> Result<UserRecord, AuthError> {
        self.get_account_info(GetAccountInfoRequest {
            phone_number: Some(vec![phone_number.to_string()]),
            ..Default::default()
        })
        .await?
        .into_iter()
        .next()
        .ok_or(AuthError::UserNotFound)
    }

    pub async fn delete_user(&self, uid: &str) -> Result<(), AuthError> {
        if uid.is_empty() {
            return Err(AuthError::UserIdRequired);
        }
        let _: serde_json::Value = self
            .call("deleteAccount", &DeleteAccountRequest { local_id: uid.to_string() })
            .await?;
        Ok(())
    }

    /// Creates an account and returns the stored record.
    ///
    /// Without a `local_id` the service assigns one; with one the account is
    /// imported and an existing account with that id is never overwritten.
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<UserRecord, AuthError> {
        let uid = match request.local_id.filter(|id| !id.is_empty()) {
            None => {
                let signup = SignupNewUserRequest {
                    email: request.email,
                    email_verified: request.email_verified,
                    password: request.password,
                    display_name: request.display_name,
                    photo_url: request.photo_url,
                    phone_number: request.phone_number,
                    disabled: request.disabled,
                };
                let response: LocalIdResponse = self.call("signupNewUser", &signup).await?;
                if response.local_id.is_empty() {
                    return Err(AuthError::CreateAccountFailed);
                }
                response.local_id
            }
            Some(local_id) => {
                let upload = UploadAccountRequest {
                    users: vec![UploadAccountUser {
                        local_id: local_id.clone(),
                        email: request.email,
                        email_verified: request.email_verified,
                        raw_password: request.password,
                        display_name: request.display_name,
                        photo_url: request.photo_url,
                        phone_number: request.phone_number,
                        disabled: request.disabled,
                    }],
                    allow_overwrite: false,
                    sanity_check: true,
                };
                let response: UploadAccountResponse = self.call("uploadAccount", &upload).await?;
                if !response.error.is_empty() {
                    return Err(AuthError::ImportFailed(response.error));
                }
                local_id
            }
        };

        self.get_user(&uid).await
    }

    pub async fn update_user(&self, request: UpdateUserRequest) -> Result<UserRecord, AuthError> {
        if request.local_id.is_empty() {
            return Err(AuthError::UserIdRequired);
        }
        let response: LocalIdResponse = self.call("setAccountInfo", &request).await?;
        let uid = if response.local_id.is_empty() {
            request.local_id
        } else {
            response.local_id
        };
        self.get_user(&uid).await
    }

    /// Starts a paginated listing of all accounts.
    pub fn list_users(&self, max_results: u32) -> ListUsersCursor {
        ListUsersCursor {
            auth: self.clone(),
            max_results,
            next_page_token: None,
            done: false,
        }
    }

    /// Signs a user in with email and password, returning their uid.
    pub async fn verify_password(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let request = VerifyPasswordRequest {
            email: email.to_string(),
            password: password.to_string(),
            return_secure_token: true,
        };
        let response: LocalIdResponse = self.call("verifyPassword", &request).await?;
        Ok(response.local_id)
    }

    pub async fn send_password_reset_email(&self, email: &str) -> Result<(), AuthError> {
        let request = OobCodeRequest {
            request_type: "PASSWORD_RESET",
            email: email.to_string(),
        };
        let _: OobCodeResponse = self.call("getOobConfirmationCode", &request).await?;
        Ok(())
    }

    pub async fn create_auth_uri(
        &self,
        provider_id: &str,
        continue_uri: &str,
        session_id: Option<&str>,
    ) -> Result<AuthUri, AuthError> {
        let request = CreateAuthUriRequest {
            provider_id: provider_id.to_string(),
            continue_uri: continue_uri.to_string(),
            session_id: session_id.map(str::to_string),
        };
        self.call("createAuthUri", &request).await
    }

    /// Completes a federated sign-in from the provider's callback URI.
    pub async fn verify_assertion(&self, request_uri: &str, session_id: &str) -> Result<AssertionResult, AuthError> {
        let request = VerifyAssertionRequest {
            request_uri: request_uri.to_string(),
            session_id: session_id.to_string(),
            return_secure_token: true,
        };
        self.call("verifyAssertion", &request).await
    }
}

/// Pages through accounts with `downloadAccount`.
pub struct ListUsersCursor {
    auth: FirebaseAuth,
    pub max_results: u32,
    next_page_token: Option<String>,
    done: bool,
}

impl ListUsersCursor {
    /// Fetches the next page, or `None` once the listing is exhausted.
    pub async fn next(&mut self) -> Result<Option<Vec<UserRecord>>, AuthError> {
        if self.done {
            return Ok(None);
        }

        let request = DownloadAccountRequest {
            max_results: self.max_results,
            next_page_token: self.next_page_token.clone(),
        };
        let response: DownloadAccountResponse = self.auth.call("downloadAccount", &request).await?;

        if response.users.is_empty() {
            self.done = true;
            return Ok(None);
        }

        self.next_page_token = response.next_page_token.filter(|t| !t.is_empty());
        if self.next_page_token.is_none() {
            self.done = true;
        }

        Ok(Some(response.users.into_iter().map(UserRecord::from).collect()))
    }
}
