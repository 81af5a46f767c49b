//! WebSocket message protocol.
//!
//! Every frame is UTF-8 JSON of shape `{type, data?, timestamp?}`. Inbound
//! frames are parsed into a [`RawFrame`] first so unknown types can be
//! dropped silently; the per-action payloads are then deserialized by the
//! router. Outbound frames are a tagged enum, and a fresh server timestamp
//! is stamped into each one at serialization time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::now_ms;
use crate::errors::{AppError, ErrorKind};
use crate::game::{GameAnswer, GameStats, LeaderboardEntry, QuestionView};
use crate::questions::Country;
use crate::room::{RoomMember, RoomSettings, RoomView, SettingsPatch};
use crate::user::{User, UserId};

/// Inbound frame before payload typing.
#[derive(Clone, Debug, Deserialize)]
pub struct RawFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// CREATE_ROOM payload.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomPayload {
    pub username: String,
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub settings: Option<SettingsPatch>,
}

/// JOIN_ROOM payload.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomPayload {
    pub invite_code: String,
    pub username: String,
}

/// SUBMIT_ANSWER payload.
#[derive(Clone, Debug, Deserialize)]
pub struct SubmitAnswerPayload {
    pub answer: String,
}

/// KICK_USER payload.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickUserPayload {
    pub user_id: UserId,
}

/// Details object attached to ERROR frames.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Complete outbound catalogue.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    AuthSuccess {
        user_id: UserId,
        is_admin: bool,
        user: User,
        room: Option<RoomView>,
    },
    CreateRoomSuccess {
        room: RoomView,
    },
    JoinRoomSuccess {
        room: RoomView,
    },
    UserJoined {
        user: RoomMember,
        room: RoomView,
    },
    #[serde(rename_all = "camelCase")]
    UserLeft {
        user_id: UserId,
        room: RoomView,
    },
    #[serde(rename_all = "camelCase")]
    UserKicked {
        user_id: UserId,
        username: String,
    },
    #[serde(rename_all = "camelCase")]
    HostChanged {
        new_host: UserId,
    },
    Kicked {
        reason: String,
    },
    GameStarting {
        countdown: u32,
    },
    GameRestarted {
        countdown: u32,
    },
    #[serde(rename_all = "camelCase")]
    NewQuestion {
        question: QuestionView,
        total_questions: u32,
    },
    #[serde(rename_all = "camelCase")]
    AnswerSubmitted {
        user_id: UserId,
        username: String,
        has_answered: bool,
        total_answers: usize,
        total_players: usize,
        points_awarded: u32,
        score: u32,
    },
    #[serde(rename_all = "camelCase")]
    QuestionResults {
        correct_answer: String,
        correct_country: Country,
        player_answers: Vec<GameAnswer>,
        leaderboard: Vec<LeaderboardEntry>,
    },
    #[serde(rename_all = "camelCase")]
    GameEnded {
        leaderboard: Vec<LeaderboardEntry>,
        game_stats: GameStats,
    },
    GameStopped,
    SettingsUpdated {
        settings: RoomSettings,
    },
    #[serde(rename_all = "camelCase")]
    RoomTtlWarning {
        room_id: String,
        expires_at: i64,
        remaining_ms: i64,
    },
    #[serde(rename_all = "camelCase")]
    RoomExpired {
        room_id: String,
    },
    Heartbeat {
        timestamp: i64,
    },
    Error {
        code: ErrorKind,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<ErrorDetails>,
    },
}

impl ServerMessage {
    /// Build an ERROR frame from an application error.
    pub fn error(err: &AppError) -> Self {
        ServerMessage::Error {
            code: err.kind,
            message: err.message.clone(),
            details: err.retry_after.map(|retry_after| ErrorDetails {
                retry_after: Some(retry_after),
            }),
        }
    }

    /// Serialize with a fresh server timestamp at the top level.
    pub fn to_frame(&self) -> String {
        let mut value = serde_json::to_value(self)
            .unwrap_or_else(|_| serde_json::json!({"type": "ERROR"}));
        if let Value::Object(ref mut map) = value {
            map.insert("timestamp".to_string(), Value::from(now_ms()));
        }
        value.to_string()
    }
}
