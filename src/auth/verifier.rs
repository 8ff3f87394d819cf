use crate::auth::keys::PublicKeyManager;
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const FIREBASE_ISSUER_PREFIX: &str = "https://securetoken.google.com/";
const MAX_SUBJECT_LEN: usize = 128;

/// Why an ID token was rejected. Checks run in a fixed order and the first
/// failure wins.
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Firebase ID token is malformed: {0}")]
    Malformed(#[source] jsonwebtoken::errors::Error),
    #[error("Firebase ID token has incorrect algorithm, expected an RSA algorithm but got {0:?}")]
    IncorrectAlgorithm(Algorithm),
    #[error("Firebase ID token has no \"kid\" header")]
    MissingKid,
    #[error("Firebase ID token has \"kid\" header which does not correspond to a known public key")]
    UnknownKid,
    #[error("Firebase ID token is invalid: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
    #[error("token expired by {0:?}")]
    Expired(Duration),
    #[error("token used before issued")]
    UsedBeforeIssued,
    #[error("Firebase ID token has incorrect \"aud\" claim, expected {expected:?} but got {actual:?}")]
    IncorrectAudience { expected: String, actual: String },
    #[error("Firebase ID token has incorrect \"iss\" claim, expected {expected:?} but got {actual:?}")]
    IncorrectIssuer { expected: String, actual: String },
    #[error("Firebase ID token has an empty \"sub\" claim")]
    EmptySubject,
    #[error("Firebase ID token has a \"sub\" claim longer than 128 characters")]
    SubjectTooLong,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirebaseInfo {
    #[serde(default)]
    pub identities: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub sign_in_provider: String,
}

/// Claims carried by a verified ID token. Anything not modelled explicitly
/// lands in `claims`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub aud: String,
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub auth_time: i64,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default)]
    pub firebase: FirebaseInfo,
    #[serde(flatten)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}

pub struct IdTokenVerifier {
    project_id: String,
    leeway: Duration,
    key_manager: Arc<PublicKeyManager>,
}

impl IdTokenVerifier {
    pub fn new(project_id: String, key_manager: Arc<PublicKeyManager>) -> Self {
        Self {
            project_id,
            leeway: Duration::ZERO,
            key_manager,
        }
    }

    /// Tolerance applied to the issued-at check only.
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn key_manager(&self) -> &Arc<PublicKeyManager> {
        &self.key_manager
    }

    pub async fn verify_token(&self, token: &str) -> Result<IdTokenClaims, TokenError> {
        let header = decode_header(token).map_err(TokenError::Malformed)?;
        if !matches!(header.alg, Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512) {
            return Err(TokenError::IncorrectAlgorithm(header.alg));
        }

        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or(TokenError::MissingKid)?;

        let key = self
            .key_manager
            .select_key(&kid)
            .await
            .ok_or(TokenError::UnknownKid)?;

        // Only the signature is checked here; claims follow in a fixed order below.
        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let mut claims = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(TokenError::Invalid)?
            .claims;

        validate_claims(&claims, Utc::now().timestamp(), self.leeway, &self.project_id)?;
        debug!(%kid, sub = %claims.sub, "verified ID token");

        claims.user_id = claims.sub.clone();
        Ok(claims)
    }
}

pub(crate) fn validate_claims(
    claims: &IdTokenClaims,
    now: i64,
    leeway: Duration,
    project_id: &str,
) -> Result<(), TokenError> {
    if now > claims.exp {
        return Err(TokenError::Expired(Duration::from_secs(
            (now - claims.exp).unsigned_abs(),
        )));
    }

    if claims.iat > now.saturating_add(i64::try_from(leeway.as_secs()).unwrap_or(i64::MAX)) {
        return Err(TokenError::UsedBeforeIssued);
    }

    if claims.aud != project_id {
        return Err(TokenError::IncorrectAudience {
            expected: project_id.to_string(),
            actual: claims.aud.clone(),
        });
    }

    let issuer = format!("{}{}", FIREBASE_ISSUER_PREFIX, project_id);
    if claims.iss != issuer {
        return Err(TokenError::IncorrectIssuer {
            expected: issuer,
            actual: claims.iss.clone(),
        });
    }

    if claims.sub.is_empty() {
        return Err(TokenError::EmptySubject);
    }

    if claims.sub.chars().count() > MAX_SUBJECT_LEN {
        return Err(TokenError::SubjectTooLong);
    }

    Ok(())
}
