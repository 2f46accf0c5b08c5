use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::clock::{Clock, SystemClock};
use crate::config::{SecurityConfig, MAX_JWT_EXPIRY_HOURS, MAX_JWT_LEEWAY_SECS};

/// Verified identity carried by a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub email: String,
    pub tenant_id: i64,
    #[serde(default)]
    pub restaurant_id: i64,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl Claims {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

/// Who a token is being issued for.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: i64,
    pub email: String,
    pub tenant_id: i64,
    pub restaurant_id: Option<i64>,
    pub role: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingCredential,

    #[error("Authorization header must use Bearer token format")]
    MalformedHeader,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Token signature mismatch")]
    SignatureMismatch,

    #[error("JWT secret not configured")]
    InvalidSecret,

    #[error("JWT generation error: {0}")]
    SigningFailed(String),
}

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub expiry: Duration,
    pub issuer: Option<String>,
    pub leeway_secs: i64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            expiry: Duration::hours(24),
            issuer: None,
            leeway_secs: 0,
        }
    }
}

/// Values are clamped to the ranges config validation enforces.
impl From<&SecurityConfig> for TokenSettings {
    fn from(security: &SecurityConfig) -> Self {
        Self {
            expiry: Duration::hours(security.jwt_expiry_hours.min(MAX_JWT_EXPIRY_HOURS) as i64),
            issuer: security.jwt_issuer.clone(),
            leeway_secs: security.jwt_leeway_secs.min(MAX_JWT_LEEWAY_SECS) as i64,
        }
    }
}

/// HS256 token verifier and issuer. Constructed once and shared by reference.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    settings: TokenSettings,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("settings", &self.settings)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &[u8], settings: TokenSettings) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::InvalidSecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the injected clock in `validate`.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iat"]);
        if let Some(issuer) = &settings.issuer {
            validation.set_issuer(&[issuer]);
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            settings,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn from_config(security: &SecurityConfig) -> Result<Self, AuthError> {
        Self::new(security.jwt_secret.as_bytes(), TokenSettings::from(security))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn issue(&self, subject: TokenSubject) -> Result<String, AuthError> {
        let now = self.clock.now();
        let expires = now
            .checked_add_signed(self.settings.expiry)
            .ok_or_else(|| AuthError::SigningFailed("token expiry is out of range".to_string()))?;
        let claims = Claims {
            user_id: subject.user_id,
            email: subject.email,
            tenant_id: subject.tenant_id,
            restaurant_id: subject.restaurant_id.unwrap_or(0),
            role: subject.role,
            iat: now.timestamp(),
            exp: expires.timestamp(),
            iss: self.settings.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::SigningFailed(e.to_string()))
    }

    /// Verify signature, issuer and lifetime. Nothing inside the token is trusted until
    /// all of them pass.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(classify)?
            .claims;

        let now = self.clock.now().timestamp();
        let leeway = self.settings.leeway_secs;

        if claims.exp.saturating_add(leeway) <= now {
            return Err(AuthError::ExpiredToken);
        }
        if claims.iat.saturating_sub(leeway) > now {
            return Err(AuthError::MalformedToken("issued in the future".to_string()));
        }

        Ok(claims)
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::SignatureMismatch,
        ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        other => AuthError::MalformedToken(format!("{other:?}")),
    }
}
