use std::time::Duration;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use handy_core::transition::Actor;
use handy_core::types::{User, UserRole};

use crate::problem::ProblemResponse;
use crate::router::AppState;

/// Claims carried by session tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub email: String,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 session tokens.
///
/// Expiry is checked against the caller-supplied clock instead of the system
/// time so handlers can run against a fixed clock.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: &User, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = TokenClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: now.timestamp() + self.ttl.as_secs() as i64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| TokenError::Encode(err.to_string()))
    }

    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| TokenError::Invalid(err.to_string()))?;
        let claims = data.claims;
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Encode(String),
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token expired")]
    Expired,
}

/// Bcrypt hashing with a configurable cost, run on the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub async fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let cost = self.cost;
        let password = password.to_string();
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|err| PasswordError::Join(err.to_string()))?
            .map_err(PasswordError::Bcrypt)
    }

    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|err| PasswordError::Join(err.to_string()))?
            .map_err(PasswordError::Bcrypt)
    }
}

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("bcrypt error: {0}")]
    Bcrypt(bcrypt::BcryptError),
    #[error("hashing task failed: {0}")]
    Join(String),
}

/// The authenticated caller, loaded fresh from storage on every request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn actor(&self) -> Actor {
        Actor::new(self.0.id, self.0.role, self.0.status)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ProblemResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| {
            reject("missing_token");
            ProblemResponse::unauthorized("missing_token", "Authorization bearer token required")
        })?;

        let claims = state.tokens().validate(token, state.now()).map_err(|err| {
            warn!(stage = "auth", error = %err, "rejected bearer token");
            reject("invalid_token");
            ProblemResponse::unauthorized("invalid_token", "token is invalid or expired")
        })?;

        let user_id: i64 = claims.sub.parse().map_err(|_| {
            reject("invalid_subject");
            ProblemResponse::unauthorized("invalid_token", "token subject is malformed")
        })?;

        let user = state
            .storage()
            .users()
            .find_by_id(user_id)
            .await
            .map_err(|err| {
                error!(stage = "auth", error = %err, "failed to load token subject");
                ProblemResponse::internal("failed to load user")
            })?
            .ok_or_else(|| {
                reject("unknown_user");
                ProblemResponse::unauthorized("invalid_token", "account no longer exists")
            })?;

        if user.is_suspended() {
            reject("suspended");
            return Err(ProblemResponse::forbidden(
                "account_suspended",
                "this account has been suspended",
            ));
        }

        Ok(Self(user))
    }
}

/// An authenticated caller holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ProblemResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.role.is_admin() {
            reject("not_admin");
            return Err(ProblemResponse::forbidden(
                "admin_required",
                "Access denied. Admin privileges required.",
            ));
        }
        Ok(Self(user))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn reject(reason: &'static str) {
    counter!("http_auth_failures_total", "reason" => reason).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use handy_core::types::UserStatus;

    fn at(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn user() -> User {
        User {
            id: 42,
            email: "ada@example.com".into(),
            password_hash: "hash".into(),
            full_name: "Ada".into(),
            role: UserRole::Student,
            status: UserStatus::Active,
            student_id: Some("S-1".into()),
            postal_code: None,
            description: None,
            avatar_url: None,
            created_at: at("2024-01-01T00:00:00Z"),
            updated_at: at("2024-01-01T00:00:00Z"),
        }
    }

    #[test]
    fn issued_token_validates_until_expiry() {
        let service = TokenService::new(b"secret", Duration::from_secs(3600));
        let now = at("2024-01-01T00:00:00Z");
        let token = service.issue(&user(), now).expect("issue");

        let claims = service
            .validate(&token, at("2024-01-01T00:59:59Z"))
            .expect("still valid");
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.role, UserRole::Student);
        assert_eq!(claims.exp - claims.iat, 3600);

        let err = service
            .validate(&token, at("2024-01-01T01:00:00Z"))
            .unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let now = at("2024-01-01T00:00:00Z");
        let token = TokenService::new(b"other", Duration::from_secs(60))
            .issue(&user(), now)
            .expect("issue");
        let err = TokenService::new(b"secret", Duration::from_secs(60))
            .validate(&token, now)
            .unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }

    #[tokio::test]
    async fn password_hash_round_trip() {
        let hasher = PasswordHasher::new(4);
        let hash = hasher.hash("hunter22").await.expect("hash");
        assert_ne!(hash, "hunter22");
        assert!(hasher.verify("hunter22", &hash).await.expect("verify"));
        assert!(!hasher.verify("hunter23", &hash).await.expect("verify"));
    }
}
