//! HS256 bearer-token verification.
//!
//! Tokens are signed by the external authenticator with a shared secret and
//! carry the caller's id, display name and role. Minting lives here too, but
//! only tests and local tooling use it.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AuthenticatedUser, IdentityError, IdentityVerifier};
use crate::core::models::Role;

/// Secret used in debug builds when `JWT_SECRET` is unset.
pub const DEV_SECRET: &str = "codeshare_dev_secret_key_not_for_production_32chars";

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    /// When set, tokens must carry a matching `iss` claim.
    pub issuer: Option<String>,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: None,
        }
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Reads `JWT_SECRET` and `JWT_ISSUER` through `lookup`.
    ///
    /// Debug builds fall back to [`DEV_SECRET`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, JwtError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = match lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None if cfg!(debug_assertions) => DEV_SECRET.to_string(),
            None => return Err(JwtError::MissingSecret),
        };

        Ok(Self {
            secret,
            issuer: lookup("JWT_ISSUER").filter(|s| !s.is_empty()),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT_SECRET environment variable not set")]
    MissingSecret,

    #[error("Token encoding failed: {0}")]
    EncodingError(String),

    #[error("Token decoding failed: {0}")]
    DecodingError(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    InvalidToken,
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidIssuer => JwtError::InvalidToken,
            _ => JwtError::DecodingError(err.to_string()),
        }
    }
}

impl From<JwtError> for IdentityError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => IdentityError::Expired,
            other => IdentityError::Invalid(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::InvalidToken)
    }

    pub fn role(&self) -> Role {
        Role::parse(&self.role)
    }
}

#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Sign a token for `user` valid for `ttl`.
    pub fn issue_token(&self, user: &AuthenticatedUser, ttl: Duration) -> Result<String, JwtError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.user_id.to_string(),
            username: user.username.clone(),
            role: user.role.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.config.issuer.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingError(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::default();
        if let Some(issuer) = &self.config.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;

        Ok(token_data.claims)
    }
}

impl IdentityVerifier for JwtService {
    fn verify(&self, credential: &str) -> Result<AuthenticatedUser, IdentityError> {
        let claims = self.validate_token(credential)?;
        let user_id = claims.user_id()?;
        let username = if claims.username.trim().is_empty() {
            format!("user_{}", &user_id.simple().to_string()[..8])
        } else {
            claims.username.clone()
        };

        Ok(AuthenticatedUser {
            user_id,
            username,
            role: claims.role(),
        })
    }
}
