use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const PROVIDER_GOOGLE: &str = "google.com";
pub const PROVIDER_FACEBOOK: &str = "facebook.com";
pub const PROVIDER_GITHUB: &str = "github.com";
pub const PROVIDER_TWITTER: &str = "twitter.com";
pub const PROVIDER_PASSWORD: &str = "password";
pub const PROVIDER_PHONE: &str = "phone";

/// A user account as returned by the admin operations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserRecord {
    pub user_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
    pub disabled: bool,
    pub password_hash: Option<String>,
    pub metadata: UserMetadata,
    pub provider_data: Vec<UserInfo>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserMetadata {
    pub created_at: Option<DateTime<Utc>>,
    pub last_signed_in_at: Option<DateTime<Utc>>,
}

/// Profile data contributed by one linked identity provider.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserInfo {
    pub user_id: String,
    pub provider_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub phone_number: Option<String>,
    pub photo_url: Option<String>,
}

/// Input for [`create_user`](crate::auth::FirebaseAuth::create_user). A
/// non-empty `local_id` imports the account under that id.
#[derive(Debug, Clone, Default)]
pub struct CreateUserRequest {
    pub local_id: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub password: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
    pub disabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub local_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(rename = "disableUser", skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

// Wire types for the relyingparty endpoints.

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountInfo {
    #[serde(default)]
    pub local_id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    pub password_hash: Option<String>,
    #[serde(default, deserialize_with = "millis")]
    pub created_at: i64,
    #[serde(default, deserialize_with = "millis")]
    pub last_login_at: i64,
    #[serde(default)]
    pub provider_user_info: Vec<ProviderUserInfo>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProviderUserInfo {
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub raw_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub phone_number: Option<String>,
    pub photo_url: Option<String>,
}

// The service sends timestamps as millisecond strings; accept numbers too.
fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Text(String),
        Number(i64),
    }
    match Option::<Millis>::deserialize(deserializer)? {
        None => Ok(0),
        Some(Millis::Number(n)) => Ok(n),
        Some(Millis::Text(s)) if s.is_empty() => Ok(0),
        Some(Millis::Text(s)) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn timestamp(millis: i64) -> Option<DateTime<Utc>> {
    if millis == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single()
}

impl From<AccountInfo> for UserRecord {
    fn from(info: AccountInfo) -> Self {
        Self {
            user_id: info.local_id,
            email: info.email,
            email_verified: info.email_verified,
            display_name: info.display_name,
            photo_url: info.photo_url,
            phone_number: info.phone_number,
            disabled: info.disabled,
            password_hash: info.password_hash,
            metadata: UserMetadata {
                created_at: timestamp(info.created_at),
                last_signed_in_at: timestamp(info.last_login_at),
            },
            provider_data: info
                .provider_user_info
                .into_iter()
                .map(|p| UserInfo {
                    user_id: p.raw_id,
                    provider_id: p.provider_id,
                    email: p.email,
                    display_name: p.display_name,
                    phone_number: p.phone_number,
                    photo_url: p.photo_url,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetAccountInfoRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_id: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetAccountInfoResponse {
    #[serde(default)]
    pub users: Vec<AccountInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LocalIdResponse {
    #[serde(default)]
    pub local_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteAccountRequest {
    pub local_id: String,
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignupNewUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadAccountUser {
    pub local_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadAccountRequest {
    pub users: Vec<UploadAccountUser>,
    pub allow_overwrite: bool,
    pub sanity_check: bool,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct UploadAccountResponse {
    #[serde(default)]
    pub error: Vec<ImportUserError>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImportUserError {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DownloadAccountRequest {
    pub max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DownloadAccountResponse {
    #[serde(default)]
    pub users: Vec<AccountInfo>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VerifyPasswordRequest {
    pub email: String,
    pub password: String,
    pub return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OobCodeRequest {
    pub request_type: &'static str,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OobCodeResponse {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateAuthUriRequest {
    pub provider_id: String,
    pub continue_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Where to send the user to sign in with a federated provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUri {
    #[serde(default)]
    pub auth_uri: String,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VerifyAssertionRequest {
    pub request_uri: String,
    pub session_id: String,
    pub return_secure_token: bool,
}

/// Identity resolved from a federated provider callback.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResult {
    #[serde(default)]
    pub local_id: String,
    #[serde(default)]
    pub provider_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub federated_id: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub is_new_user: bool,
}
