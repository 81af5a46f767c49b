//! Application error kinds shared by the WebSocket and HTTP surfaces.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error code carried in `ERROR` frames and HTTP envelopes.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ValidationError,
    AuthenticationError,
    AuthorizationError,
    NotFound,
    RateLimitExceeded,
    InvalidInput,
    InternalError,
    WebsocketMessageError,
    RoomNotFound,
    RoomFull,
    GameNotActive,
    InvalidGameState,
    UserNotFound,
    PermissionDenied,
    UserAlreadyInRoom,
    UsernameTaken,
    KickedFromRoom,
}

impl ErrorKind {
    /// Code string as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::AuthenticationError => "AUTHENTICATION_ERROR",
            ErrorKind::AuthorizationError => "AUTHORIZATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::InternalError => "INTERNAL_ERROR",
            ErrorKind::WebsocketMessageError => "WEBSOCKET_MESSAGE_ERROR",
            ErrorKind::RoomNotFound => "ROOM_NOT_FOUND",
            ErrorKind::RoomFull => "ROOM_FULL",
            ErrorKind::GameNotActive => "GAME_NOT_ACTIVE",
            ErrorKind::InvalidGameState => "INVALID_GAME_STATE",
            ErrorKind::UserNotFound => "USER_NOT_FOUND",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::UserAlreadyInRoom => "USER_ALREADY_IN_ROOM",
            ErrorKind::UsernameTaken => "USERNAME_TAKEN",
            ErrorKind::KickedFromRoom => "KICKED_FROM_ROOM",
        }
    }
}

/// An error surfaced to a client.
///
/// WebSocket handlers emit these as `ERROR` frames without closing the
/// connection; HTTP handlers wrap them in the JSON error envelope with the
/// matching status.
#[derive(Clone, Debug, Error, Serialize, Deserialize)]
#[error("{}: {message}", .kind.as_str())]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    /// Seconds until a rate-limited action may be retried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn room_not_found() -> Self {
        Self::new(ErrorKind::RoomNotFound, "room not found")
    }

    pub fn user_not_found() -> Self {
        Self::new(ErrorKind::UserNotFound, "user not found")
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn invalid_game_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidGameState, message)
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        Self {
            kind: ErrorKind::RateLimitExceeded,
            message: "rate limit exceeded".to_string(),
            retry_after: Some(retry_after),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }
}
