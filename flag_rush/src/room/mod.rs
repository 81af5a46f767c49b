//! Rooms: the in-memory session grouping of 2–5 players.
//!
//! The [`RoomStore`] exclusively owns room records; every room sits behind
//! its own `tokio::sync::Mutex`, and all reads and writes of a room's fields
//! (members, settings, kicked set, game state) happen under that lock. Lock
//! order across the system is store map → room → user store → connection
//! registry.

mod settings;
mod store;

pub use settings::{Difficulty, GameMode, RoomSettings, SettingsPatch};
pub use store::RoomStore;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::constants::MAX_ROOM_LIFETIME_SECS;
use crate::errors::{AppError, AppResult, ErrorKind};
use crate::game::{GameState, GameStateView};
use crate::user::UserId;

/// Opaque room identifier.
pub type RoomId = String;

/// A user's seat in a room. Insertion order is preserved; the first member
/// is next in line for host succession.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    pub user_id: UserId,
    pub username: String,
    /// Running score for the current (or last finished) game.
    pub score: u32,
    /// True once the member has answered the current question.
    pub has_answered: bool,
}

/// One game room.
#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    /// Host user id; always a member while the room is non-empty.
    pub host: UserId,
    /// Six uppercase alphanumerics, unique across live rooms.
    pub invite_code: String,
    pub settings: RoomSettings,
    pub members: Vec<RoomMember>,
    /// Users barred from rejoining.
    pub kicked_users: HashSet<UserId>,
    pub created_at: DateTime<Utc>,
    /// Set when the last member leaves; cleared on join.
    pub emptied_at: Option<DateTime<Utc>>,
    /// A TTL warning has been broadcast for this room.
    pub ttl_warned: bool,
    pub game: GameState,
}

impl Room {
    pub fn is_full(&self) -> bool {
        self.members.len() >= self.settings.max_room_size
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }

    pub fn has_username(&self, username: &str) -> bool {
        self.members.iter().any(|m| m.username == username)
    }

    pub fn member(&self, user_id: &str) -> Option<&RoomMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn member_mut(&mut self, user_id: &str) -> Option<&mut RoomMember> {
        self.members.iter_mut().find(|m| m.user_id == user_id)
    }

    pub fn member_ids(&self) -> Vec<UserId> {
        self.members.iter().map(|m| m.user_id.clone()).collect()
    }

    /// Admit a user, enforcing the kicked set, capacity, and username
    /// uniqueness.
    pub fn add_member(&mut self, user_id: &str, username: &str) -> AppResult<()> {
        if self.kicked_users.contains(user_id) {
            return Err(AppError::new(
                ErrorKind::KickedFromRoom,
                "you were kicked from this room",
            ));
        }
        if self.has_member(user_id) {
            return Err(AppError::new(
                ErrorKind::UserAlreadyInRoom,
                "already in this room",
            ));
        }
        if self.is_full() {
            return Err(AppError::new(ErrorKind::RoomFull, "room is full"));
        }
        if self.has_username(username) {
            return Err(AppError::new(
                ErrorKind::UsernameTaken,
                "that name is taken in this room",
            ));
        }
        self.members.push(RoomMember {
            user_id: user_id.to_string(),
            username: username.to_string(),
            score: 0,
            has_answered: false,
        });
        self.emptied_at = None;
        Ok(())
    }

    /// Remove a member, marking the emptied timestamp when the room drains.
    pub fn remove_member(&mut self, user_id: &str) -> Option<RoomMember> {
        let idx = self.members.iter().position(|m| m.user_id == user_id)?;
        let removed = self.members.remove(idx);
        if self.members.is_empty() {
            self.emptied_at = Some(Utc::now());
        }
        Some(removed)
    }

    /// Promote the first remaining member to host. Returns the new host id.
    pub fn promote_next_host(&mut self) -> Option<UserId> {
        let next = self.members.first()?;
        self.host = next.user_id.clone();
        Some(self.host.clone())
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(MAX_ROOM_LIFETIME_SECS)
    }

    /// Full wire view for members and the admin dump.
    pub fn view(&self) -> RoomView {
        RoomView {
            id: self.id.clone(),
            name: self.name.clone(),
            host: self.host.clone(),
            invite_code: self.invite_code.clone(),
            settings: self.settings,
            members: self.members.clone(),
            created_at: self.created_at.timestamp_millis(),
            game: self.game.view(),
        }
    }

    /// Public lookup view served from `/api/rooms/{inviteCode}`.
    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            member_count: self.members.len(),
            max_room_size: self.settings.max_room_size,
            is_active: self.game.is_active,
            game_mode: self.settings.game_mode,
        }
    }
}

/// Wire view of a room.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: RoomId,
    pub name: String,
    pub host: UserId,
    pub invite_code: String,
    pub settings: RoomSettings,
    pub members: Vec<RoomMember>,
    pub created_at: i64,
    pub game: GameStateView,
}

/// Public room summary (no member identities).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub member_count: usize,
    pub max_room_size: usize,
    pub is_active: bool,
    pub game_mode: GameMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_room() -> Room {
        Room {
            id: "room-1".to_string(),
            name: "Test Room".to_string(),
            host: "host".to_string(),
            invite_code: "ABC123".to_string(),
            settings: RoomSettings {
                max_room_size: 2,
                ..RoomSettings::default()
            },
            members: vec![RoomMember {
                user_id: "host".to_string(),
                username: "alice".to_string(),
                score: 0,
                has_answered: false,
            }],
            kicked_users: HashSet::new(),
            created_at: Utc::now(),
            emptied_at: None,
            ttl_warned: false,
            game: GameState::default(),
        }
    }

    #[test]
    fn test_add_member_enforces_capacity() {
        let mut room = test_room();
        room.add_member("u2", "bob").unwrap();
        let err = room.add_member("u3", "carol").unwrap_err();
        assert_eq!(err.kind, ErrorKind::RoomFull);
        assert_eq!(room.members.len(), 2);
    }

    #[test]
    fn test_add_member_rejects_duplicate_username() {
        let mut room = test_room();
        let err = room.add_member("u2", "alice").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UsernameTaken);
    }

    #[test]
    fn test_add_member_rejects_kicked_user() {
        let mut room = test_room();
        room.kicked_users.insert("u2".to_string());
        let err = room.add_member("u2", "bob").unwrap_err();
        assert_eq!(err.kind, ErrorKind::KickedFromRoom);
    }

    #[test]
    fn test_remove_last_member_marks_emptied() {
        let mut room = test_room();
        assert!(room.emptied_at.is_none());
        room.remove_member("host").unwrap();
        assert!(room.emptied_at.is_some());
    }

    #[test]
    fn test_rejoin_clears_emptied_marker() {
        let mut room = test_room();
        room.remove_member("host").unwrap();
        room.add_member("u2", "bob").unwrap();
        assert!(room.emptied_at.is_none());
    }

    #[test]
    fn test_promote_next_host_takes_first_member() {
        let mut room = test_room();
        room.add_member("u2", "bob").unwrap();
        room.remove_member("host").unwrap();
        assert_eq!(room.promote_next_host().unwrap(), "u2");
        assert_eq!(room.host, "u2");
    }
}
