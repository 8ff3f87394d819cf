use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    High,
}

/// A downstream message in the FCM legacy HTTP format.
///
/// The `send_to_*` methods fill in the recipient fields; everything else is
/// passed through as-is.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub registration_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutable_content: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_while_idle: Option<bool>,
    /// Seconds, at most four weeks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restricted_package_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Notification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android_channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_loc_key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub body_loc_args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_loc_key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub title_loc_args: Vec<String>,
}

/// Outcome of a send or topic-management call.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub multicast_id: i64,
    #[serde(default)]
    pub success: u32,
    #[serde(default)]
    pub failure: u32,
    #[serde(default)]
    pub canonical_ids: u32,
    #[serde(default)]
    pub results: Vec<SendResult>,
    /// Set for topic sends, which report a single message id.
    #[serde(default)]
    pub message_id: Option<i64>,
    #[serde(default, deserialize_with = "provider_error")]
    pub error: Option<ProviderError>,
}

/// Per-recipient result, in request order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SendResult {
    #[serde(default)]
    pub message_id: Option<String>,
    /// The token the device should use from now on, when it changed.
    #[serde(default)]
    pub registration_id: Option<String>,
    #[serde(default, deserialize_with = "provider_error")]
    pub error: Option<ProviderError>,
}

/// Error codes reported by FCM for individual recipients.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("missing registration token")]
    MissingRegistration,
    #[error("invalid registration token")]
    InvalidRegistration,
    #[error("registration token is no longer valid")]
    NotRegistered,
    #[error("invalid package name")]
    InvalidPackageName,
    #[error("registration token belongs to a different sender")]
    MismatchSenderId,
    #[error("message payload is too big")]
    MessageTooBig,
    #[error("invalid data key")]
    InvalidDataKey,
    #[error("invalid time to live")]
    InvalidTtl,
    #[error("service unavailable, retry with exponential backoff")]
    Unavailable,
    #[error("internal server error, retry with exponential backoff")]
    InternalServerError,
    #[error("too many messages to this device")]
    DeviceMessageRateExceeded,
    #[error("too many messages to this topic")]
    TopicsMessageRateExceeded,
    #[error("invalid APNs credentials")]
    InvalidApnsCredential,
    #[error("unknown provider error: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Maps a wire code to its variant. An empty code means no error.
    pub fn from_code(code: &str) -> Option<Self> {
        let err = match code {
            "" => return None,
            "MissingRegistration" => Self::MissingRegistration,
            "InvalidRegistration" => Self::InvalidRegistration,
            "NotRegistered" => Self::NotRegistered,
            "InvalidPackageName" => Self::InvalidPackageName,
            "MismatchSenderId" => Self::MismatchSenderId,
            "MessageTooBig" => Self::MessageTooBig,
            "InvalidDataKey" => Self::InvalidDataKey,
            "InvalidTtl" => Self::InvalidTtl,
            "Unavailable" => Self::Unavailable,
            "InternalServerError" => Self::InternalServerError,
            "DeviceMessageRateExceeded" => Self::DeviceMessageRateExceeded,
            "TopicsMessageRateExceeded" => Self::TopicsMessageRateExceeded,
            "InvalidApnsCredential" => Self::InvalidApnsCredential,
            other => Self::Unknown(other.to_string()),
        };
        Some(err)
    }

    pub fn code(&self) -> &str {
        match self {
            Self::MissingRegistration => "MissingRegistration",
            Self::InvalidRegistration => "InvalidRegistration",
            Self::NotRegistered => "NotRegistered",
            Self::InvalidPackageName => "InvalidPackageName",
            Self::MismatchSenderId => "MismatchSenderId",
            Self::MessageTooBig => "MessageTooBig",
            Self::InvalidDataKey => "InvalidDataKey",
            Self::InvalidTtl => "InvalidTtl",
            Self::Unavailable => "Unavailable",
            Self::InternalServerError => "InternalServerError",
            Self::DeviceMessageRateExceeded => "DeviceMessageRateExceeded",
            Self::TopicsMessageRateExceeded => "TopicsMessageRateExceeded",
            Self::InvalidApnsCredential => "InvalidApnsCredential",
            Self::Unknown(code) => code,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable | Self::InternalServerError)
    }
}

fn provider_error<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<ProviderError>, D::Error> {
    let code = Option::<String>::deserialize(deserializer)?;
    Ok(code.as_deref().and_then(ProviderError::from_code))
}
