use std::fmt;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{AuthPayload, UserRole};

/// Session and verification tokens both live for 24 hours.
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Session token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: UserRole,
    pub iat: usize,
    pub exp: usize,
}

impl Claims {
    pub fn payload(&self) -> AppResult<AuthPayload> {
        let user_id = Uuid::parse_str(&self.sub).map_err(|_| AppError::InvalidToken)?;
        Ok(AuthPayload {
            user_id,
            role: self.role,
        })
    }
}

/// Email verification token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationClaims {
    pub email: String,
    pub iat: usize,
    pub exp: usize,
}

/// HS256 signing and verification keys derived from the configured secret.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    pub fn issue_session(&self, user_id: Uuid, role: UserRole) -> AppResult<String> {
        let (iat, exp) = lifetime();
        self.sign(&Claims {
            sub: user_id.to_string(),
            role,
            iat,
            exp,
        })
    }

    pub fn issue_verification(&self, email: &str) -> AppResult<String> {
        let (iat, exp) = lifetime();
        self.sign(&VerificationClaims {
            email: email.to_string(),
            iat,
            exp,
        })
    }

    pub fn verify_session(&self, token: &str) -> AppResult<Claims> {
        self.verify(token)
    }

    pub fn verify_verification(&self, token: &str) -> AppResult<VerificationClaims> {
        self.verify(token)
    }

    pub(crate) fn sign<T: Serialize>(&self, claims: &T) -> AppResult<String> {
        encode(&Header::default(), claims, &self.encoding).map_err(AppError::internal)
    }

    fn verify<T: DeserializeOwned>(&self, token: &str) -> AppResult<T> {
        decode::<T>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::InvalidToken)
    }
}

// Keys are secret material.
impl fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenKeys").finish_non_exhaustive()
    }
}

fn lifetime() -> (usize, usize) {
    let now = Utc::now();
    let exp = now + Duration::hours(TOKEN_TTL_HOURS);
    (now.timestamp() as usize, exp.timestamp() as usize)
}
