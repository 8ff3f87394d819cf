//! Firebase Cloud Messaging through the legacy HTTP endpoints, authenticated
//! with the project's server key.

use crate::core::{is_transient_middleware, is_transient_request, is_transient_status, parse_error_response};
use crate::messaging::models::{Message, Response};
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub mod models;

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";
const IID_URL: &str = "https://iid.googleapis.com";
const TOPIC_PREFIX: &str = "/topics/";

pub const MAX_REGISTRATION_IDS: usize = 1000;
pub const MAX_TIME_TO_LIVE: u32 = 2_419_200;
pub const MAX_CONDITION_OPERATORS: usize = 2;

/// A message rejected before it was sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message has no recipient")]
    MissingRecipient,
    #[error("condition has {0} logical operators, at most 2 are allowed")]
    TooManyConditionOperators(usize),
    #[error("{0} registration tokens given, at most 1000 are allowed")]
    TooManyRegistrationIds(usize),
    #[error("time to live of {0}s exceeds four weeks")]
    InvalidTimeToLive(u32),
    #[error("no registration tokens given")]
    EmptyRegistrationTokens,
}

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("invalid message: {0}")]
    Validation(#[from] ValidationError),
    #[error("an API key is required to use Cloud Messaging")]
    ApiKeyRequired,
}

impl MessagingError {
    pub fn is_retryable(&self) -> bool {
        match self {
            MessagingError::RequestError(e) => is_transient_request(e),
            MessagingError::MiddlewareError(e) => is_transient_middleware(e),
            MessagingError::ApiError { status, .. } => is_transient_status(*status),
            _ => false,
        }
    }
}

#[derive(Serialize)]
struct TopicManagementRequest<'a> {
    to: String,
    registration_tokens: &'a [&'a str],
}

#[derive(Clone)]
pub struct FirebaseMessaging {
    client: ClientWithMiddleware,
    api_key: Option<String>,
    send_url: String,
    iid_url: String,
}

impl FirebaseMessaging {
    pub fn new(client: ClientWithMiddleware, api_key: Option<String>) -> Self {
        Self::new_with_url(client, api_key, FCM_SEND_URL.to_string(), IID_URL.to_string())
    }

    pub(crate) fn new_with_url(
        client: ClientWithMiddleware,
        api_key: Option<String>,
        send_url: String,
        iid_url: String,
    ) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
            send_url,
            iid_url: iid_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn send_to_device(&self, registration_token: &str, mut message: Message) -> Result<Response, MessagingError> {
        message.to = Some(registration_token.to_string());
        message.registration_ids.clear();
        message.condition = None;
        self.send(&message).await
    }

    /// Multicast to up to 1000 registration tokens.
    pub async fn send_to_devices(&self, registration_tokens: &[&str], mut message: Message) -> Result<Response, MessagingError> {
        message.to = None;
        message.registration_ids = registration_tokens.iter().map(|s| s.to_string()).collect();
        message.condition = None;
        self.send(&message).await
    }

    pub async fn send_to_device_group(&self, notification_key: &str, message: Message) -> Result<Response, MessagingError> {
        self.send_to_device(notification_key, message).await
    }

    /// `topic` may be given with or without the `/topics/` prefix.
    pub async fn send_to_topic(&self, topic: &str, message: Message) -> Result<Response, MessagingError> {
        self.send_to_device(&normalize_topic(topic), message).await
    }

    /// Sends to devices matching a topic expression such as
    /// `'dogs' in topics || 'cats' in topics`.
    pub async fn send_to_condition(&self, condition: &str, mut message: Message) -> Result<Response, MessagingError> {
        message.to = None;
        message.registration_ids.clear();
        message.condition = Some(condition.to_string());
        self.send(&message).await
    }

    pub async fn subscribe_to_topic(&self, registration_tokens: &[&str], topic: &str) -> Result<Response, MessagingError> {
        self.manage_topic(registration_tokens, topic, "batchAdd").await
    }

    pub async fn unsubscribe_from_topic(&self, registration_tokens: &[&str], topic: &str) -> Result<Response, MessagingError> {
        self.manage_topic(registration_tokens, topic, "batchRemove").await
    }

    async fn send(&self, message: &Message) -> Result<Response, MessagingError> {
        validate_message(message)?;
        self.post(&self.send_url, message).await
    }

    async fn manage_topic(
        &self,
        registration_tokens: &[&str],
        topic: &str,
        operation: &str,
    ) -> Result<Response, MessagingError> {
        if registration_tokens.is_empty() {
            return Err(ValidationError::EmptyRegistrationTokens.into());
        }
        if registration_tokens.len() > MAX_REGISTRATION_IDS {
            return Err(ValidationError::TooManyRegistrationIds(registration_tokens.len()).into());
        }

        let request = TopicManagementRequest {
            to: normalize_topic(topic),
            registration_tokens,
        };
        let url = format!("{}/iid/v1:{}", self.iid_url, operation);
        self.post(&url, &request).await
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<Response, MessagingError> {
        let api_key = self.api_key.as_deref().ok_or(MessagingError::ApiKeyRequired)?;

        debug!(%url, "cloud messaging request");
        let response = self
            .client
            .post(url)
            .header(header::AUTHORIZATION, format!("key={}", api_key))
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(body)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = parse_error_response(response, "FCM request failed").await;
            return Err(MessagingError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

fn normalize_topic(topic: &str) -> String {
    if topic.starts_with(TOPIC_PREFIX) {
        topic.to_string()
    } else {
        format!("{}{}", TOPIC_PREFIX, topic.trim_start_matches('/'))
    }
}

fn validate_message(message: &Message) -> Result<(), ValidationError> {
    let has_to = message.to.as_deref().is_some_and(|t| !t.is_empty());
    let condition = message.condition.as_deref().unwrap_or_default();

    if !condition.is_empty() {
        let operators = condition.matches("&&").count() + condition.matches("||").count();
        if operators > MAX_CONDITION_OPERATORS {
            return Err(ValidationError::TooManyConditionOperators(operators));
        }
    }

    if !has_to && message.registration_ids.is_empty() && condition.is_empty() {
        return Err(ValidationError::MissingRecipient);
    }

    if message.registration_ids.len() > MAX_REGISTRATION_IDS {
        return Err(ValidationError::TooManyRegistrationIds(message.registration_ids.len()));
    }

    if let Some(ttl) = message.time_to_live {
        if ttl > MAX_TIME_TO_LIVE {
            return Err(ValidationError::InvalidTimeToLive(ttl));
        }
    }

    Ok(())
}
