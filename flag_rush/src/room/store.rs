//! Room store: rooms keyed by id with a secondary invite-code index.

use chrono::Utc;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{Room, RoomId, RoomSettings};
use crate::constants::{INVITE_CODE_LEN, INVITE_CODE_MAX_RETRIES};
use crate::errors::{AppError, AppResult};
use crate::game::GameState;
use crate::user::UserId;

const INVITE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Default)]
struct Index {
    rooms: HashMap<RoomId, Arc<Mutex<Room>>>,
    invites: HashMap<String, RoomId>,
}

/// Owns every live room. Rooms are handed out as `Arc<Mutex<Room>>`; callers
/// must not hold a room lock while reacquiring the store map.
#[derive(Default)]
pub struct RoomStore {
    index: RwLock<Index>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room with the caller as host and sole member.
    ///
    /// # Arguments
    ///
    /// * `host_id` - Creating user; becomes host
    /// * `host_username` - Validated display name for the host's seat
    /// * `name` - Room name
    /// * `settings` - Full settings record (already validated ranges are
    ///   re-checked)
    ///
    /// # Returns
    ///
    /// * `Arc<Mutex<Room>>` - Handle to the new room
    ///
    /// # Errors
    ///
    /// * `VALIDATION_ERROR` - Settings out of range
    /// * `INTERNAL_ERROR` - Invite code space exhausted (never in practice)
    pub async fn create(
        &self,
        host_id: &UserId,
        host_username: &str,
        name: String,
        settings: RoomSettings,
    ) -> AppResult<Arc<Mutex<Room>>> {
        settings.validate()?;

        let mut index = self.index.write().await;
        let invite_code = generate_invite_code(&index.invites)?;
        let id = Uuid::new_v4().to_string();

        let mut room = Room {
            id: id.clone(),
            name,
            host: host_id.clone(),
            invite_code: invite_code.clone(),
            settings,
            members: Vec::new(),
            kicked_users: HashSet::new(),
            created_at: Utc::now(),
            emptied_at: None,
            ttl_warned: false,
            game: GameState::default(),
        };
        room.add_member(host_id, host_username)?;

        let handle = Arc::new(Mutex::new(room));
        index.rooms.insert(id.clone(), handle.clone());
        index.invites.insert(invite_code, id.clone());

        log::info!("created room {id}");
        Ok(handle)
    }

    pub async fn get(&self, room_id: &str) -> Option<Arc<Mutex<Room>>> {
        self.index.read().await.rooms.get(room_id).cloned()
    }

    /// Resolve a room by its invite code (already case-folded by validation).
    pub async fn find_by_invite(&self, invite_code: &str) -> Option<Arc<Mutex<Room>>> {
        let index = self.index.read().await;
        let room_id = index.invites.get(invite_code)?;
        index.rooms.get(room_id).cloned()
    }

    /// Drop a room and its invite index entry. Returns the handle so callers
    /// can finish teardown (cancel timers, notify members) afterwards.
    pub async fn remove(&self, room_id: &str) -> Option<Arc<Mutex<Room>>> {
        let mut index = self.index.write().await;
        let handle = index.rooms.remove(room_id)?;
        index.invites.retain(|_, id| id != room_id);
        log::info!("removed room {room_id}");
        Some(handle)
    }

    pub async fn count(&self) -> usize {
        self.index.read().await.rooms.len()
    }

    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.index.read().await.rooms.keys().cloned().collect()
    }

    /// Handles to every live room, for sweeps and admin dumps.
    pub async fn all(&self) -> Vec<Arc<Mutex<Room>>> {
        self.index.read().await.rooms.values().cloned().collect()
    }

    /// Scan for a live room hosted by the given user. Used by reconnect
    /// hydration when the user record has lost its room binding.
    pub async fn find_hosted_by(&self, user_id: &str) -> Option<Arc<Mutex<Room>>> {
        let handles = self.all().await;
        for handle in handles {
            if handle.lock().await.host == user_id {
                return Some(handle);
            }
        }
        None
    }
}

/// Generate an unused invite code, retrying on collision.
fn generate_invite_code(live: &HashMap<String, RoomId>) -> AppResult<String> {
    let mut rng = rand::thread_rng();
    for _ in 0..INVITE_CODE_MAX_RETRIES {
        let code: String = (0..INVITE_CODE_LEN)
            .map(|_| INVITE_ALPHABET[rng.gen_range(0..INVITE_ALPHABET.len())] as char)
            .collect();
        if !live.contains_key(&code) {
            return Ok(code);
        }
    }
    Err(AppError::internal("failed to allocate an invite code"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_lookup_by_invite() {
        let store = RoomStore::new();
        let handle = store
            .create(
                &"host".to_string(),
                "alice",
                "Room".to_string(),
                RoomSettings::default(),
            )
            .await
            .unwrap();
        let code = handle.lock().await.invite_code.clone();

        assert_eq!(code.len(), INVITE_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

        let found = store.find_by_invite(&code).await.unwrap();
        assert_eq!(found.lock().await.id, handle.lock().await.id);
    }

    #[tokio::test]
    async fn test_creator_is_host_and_member() {
        let store = RoomStore::new();
        let handle = store
            .create(
                &"host".to_string(),
                "alice",
                "Room".to_string(),
                RoomSettings::default(),
            )
            .await
            .unwrap();
        let room = handle.lock().await;
        assert_eq!(room.host, "host");
        assert!(room.has_member("host"));
        assert_eq!(room.members.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_clears_invite_index() {
        let store = RoomStore::new();
        let handle = store
            .create(
                &"host".to_string(),
                "alice",
                "Room".to_string(),
                RoomSettings::default(),
            )
            .await
            .unwrap();
        let (id, code) = {
            let room = handle.lock().await;
            (room.id.clone(), room.invite_code.clone())
        };
        store.remove(&id).await.unwrap();
        assert!(store.get(&id).await.is_none());
        assert!(store.find_by_invite(&code).await.is_none());
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_invite_codes_are_unique() {
        let store = RoomStore::new();
        let mut codes = HashSet::new();
        for i in 0..50 {
            let handle = store
                .create(
                    &format!("host{i}"),
                    "alice",
                    "Room".to_string(),
                    RoomSettings::default(),
                )
                .await
                .unwrap();
            let code = handle.lock().await.invite_code.clone();
            assert!(codes.insert(code), "invite code collided");
        }
    }

    #[tokio::test]
    async fn test_find_hosted_by() {
        let store = RoomStore::new();
        store
            .create(
                &"host".to_string(),
                "alice",
                "Room".to_string(),
                RoomSettings::default(),
            )
            .await
            .unwrap();
        assert!(store.find_hosted_by("host").await.is_some());
        assert!(store.find_hosted_by("stranger").await.is_none());
    }
}
