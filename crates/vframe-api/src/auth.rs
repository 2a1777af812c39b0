//! Bearer token authentication.

use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use vframe_models::OwnerId;

use crate::error::ApiError;
use crate::state::AppState;

/// Token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub user_id: i64,
    /// Expiration (unix seconds)
    pub exp: i64,
}

/// Authenticated caller extracted from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub owner_id: OwnerId,
    pub username: String,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            owner_id: OwnerId(claims.user_id),
            username: claims.username,
        }
    }
}

/// HS256 signing and verification keys.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Issue a token for `user_id` valid for `ttl`.
    pub fn issue(&self, user_id: i64, username: &str, ttl: Duration) -> Result<String, ApiError> {
        let claims = Claims {
            username: username.to_string(),
            user_id,
            exp: chrono::Utc::now().timestamp() + ttl.as_secs() as i64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::internal(format!("Failed to sign token: {}", e)))
    }

    /// Verify signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("Token rejected: {}", e);
                ApiError::unauthorized(format!("Token validation failed: {}", e))
            })
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header format"))?;

        let claims = state.jwt.verify(token)?;

        Ok(AuthUser::from(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let keys = JwtKeys::new("secret");
        let token = keys.issue(7, "alice", Duration::from_secs(60)).unwrap();

        let user = AuthUser::from(keys.verify(&token).unwrap());
        assert_eq!(user.owner_id, OwnerId(7));
        assert_eq!(user.username, "alice");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = JwtKeys::new("secret")
            .issue(7, "alice", Duration::from_secs(60))
            .unwrap();

        let err = JwtKeys::new("other").verify(&token).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let keys = JwtKeys::new("secret");
        let claims = Claims {
            username: "alice".into(),
            user_id: 7,
            exp: chrono::Utc::now().timestamp() - 3600,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).unwrap();

        tokio_test::assert_err!(keys.verify(&token));
    }
}
