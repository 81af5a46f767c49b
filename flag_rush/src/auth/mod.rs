//! Session token management.
//!
//! Identity is a signed session token carried in the `session_token` cookie
//! and verified before the WebSocket upgrade completes. The token is an
//! HS256 JWT whose subject is the opaque `userId`; there are no passwords or
//! accounts behind it.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult, ErrorKind};
use crate::user::UserId;

/// Claims inside a session token.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SessionClaims {
    /// User ID.
    pub sub: UserId,
    /// Expiration timestamp (seconds).
    pub exp: i64,
    /// Issued-at timestamp (seconds).
    pub iat: i64,
}

/// Signs and verifies session tokens.
#[derive(Clone)]
pub struct SessionTokenManager {
    secret: String,
    token_duration: Duration,
}

impl SessionTokenManager {
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            token_duration: Duration::days(30),
        }
    }

    /// Issue a token for a fresh user id. Used by the HTTP layer when a
    /// client arrives without a session cookie.
    pub fn issue_for_new_user(&self) -> AppResult<(UserId, String)> {
        let user_id = Uuid::new_v4().to_string();
        let token = self.issue(&user_id)?;
        Ok((user_id, token))
    }

    /// Sign a session token for the given user id.
    pub fn issue(&self, user_id: &str) -> AppResult<String> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user_id.to_string(),
            exp: (now + self.token_duration).timestamp(),
            iat: now.timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::internal(format!("failed to sign session token: {e}")))
    }

    /// Verify a session token and return the user id it names.
    pub fn verify(&self, token: &str) -> AppResult<UserId> {
        let data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::new(ErrorKind::AuthenticationError, "invalid session token"))?;
        Ok(data.claims.sub)
    }
}
