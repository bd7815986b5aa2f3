//! Caller identity resolution.
//!
//! Two caller classes reach the gateway: interactive sessions carrying a
//! bearer JWT tied to a user id, and programmatic callers carrying the single
//! static API key, which always maps to the system owner. The extractors only
//! resolve "which config owner applies"; nothing else.

use crate::gateway::SYSTEM_OWNER_ID;
use crate::models::AppState;
use crate::types::{AppError, AppResult};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub username: String,
    pub exp: usize,
}

pub fn issue_token(user_id: i64, username: &str, secret: &str, ttl_secs: i64) -> AppResult<String> {
    let exp = chrono::Utc::now().timestamp() + ttl_secs;
    let claims = Claims {
        id: user_id,
        username: username.to_string(),
        exp: exp as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign token: {}", e)))
}

pub fn verify_token(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Auth("invalid or expired token".to_string()))
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .and_then(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed))
        .is_ok()
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

/// Interactive caller, resolved from a bearer JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Auth("missing bearer token".to_string()))?;
        let claims = verify_token(&token, &state.config.auth.secret)?;
        Ok(AuthUser {
            id: claims.id,
            username: claims.username,
        })
    }
}

/// Programmatic caller, resolved from the static API key via the
/// `X-API-Key` header or a bearer token. Always acts as the system owner.
#[derive(Debug, Clone)]
pub struct ApiCaller {
    pub owner_id: i64,
}

impl FromRequestParts<AppState> for ApiCaller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let expected = &state.config.auth.api_key;
        if expected.is_empty() {
            return Err(AppError::Auth("API uploads are disabled".to_string()));
        }

        let provided = parts
            .headers
            .get("x-api-key")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
            .or_else(|| bearer_token(parts))
            .ok_or_else(|| AppError::Auth("missing API key".to_string()))?;

        if provided != *expected {
            return Err(AppError::Auth("invalid API key".to_string()));
        }

        Ok(ApiCaller {
            owner_id: SYSTEM_OWNER_ID,
        })
    }
}
