use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use yup_oauth2::ServiceAccountKey;

pub const CUSTOM_TOKEN_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";
pub const CUSTOM_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Payload of a custom sign-in token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomTokenClaims<C> {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<C>,
}

/// The service account's RSA key, parsed once and used to sign custom tokens.
pub struct ServiceAccountSigner {
    client_email: String,
    key: EncodingKey,
}

impl ServiceAccountSigner {
    pub fn from_key(key: &ServiceAccountKey) -> Result<Self, jsonwebtoken::errors::Error> {
        Ok(Self {
            client_email: key.client_email.clone(),
            key: EncodingKey::from_rsa_pem(key.private_key.as_bytes())?,
        })
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    pub fn sign<C: Serialize>(
        &self,
        uid: &str,
        claims: Option<&C>,
        now: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let payload = CustomTokenClaims {
            iss: self.client_email.clone(),
            sub: self.client_email.clone(),
            aud: CUSTOM_TOKEN_AUDIENCE.to_string(),
            iat: now,
            exp: now + CUSTOM_TOKEN_LIFETIME_SECS,
            uid: uid.to_string(),
            claims,
        };
        encode(&Header::new(Algorithm::RS256), &payload, &self.key)
    }
}
