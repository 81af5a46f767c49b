//! In-memory user store.
//!
//! Users are created at first authenticated connection and destroyed by the
//! disconnect flow or the inactivity sweep. The store never outlives the
//! process; there is no persistence behind it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::room::RoomId;

/// Opaque user identifier issued in the session token.
pub type UserId = String;

/// A connected (or recently connected) player.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// Room the user currently belongs to, if any.
    pub room_id: Option<RoomId>,
    /// True while the user hosts their current room.
    pub is_admin: bool,
    pub created: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    /// Ephemeral id of the live socket, if one is attached.
    pub socket_id: Option<String>,
}

impl User {
    pub fn new(id: UserId) -> Self {
        let now = Utc::now();
        // Placeholder until a validated name arrives with CREATE_ROOM/JOIN_ROOM.
        let suffix: String = id.chars().take(8).collect();
        Self {
            id,
            username: format!("Player-{suffix}"),
            room_id: None,
            is_admin: false,
            created: now,
            last_active: now,
            socket_id: None,
        }
    }
}

/// Store of live users keyed by id.
#[derive(Default)]
pub struct UserStore {
    users: RwLock<HashMap<UserId, User>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a snapshot of a user.
    pub async fn get(&self, user_id: &str) -> Option<User> {
        self.users.read().await.get(user_id).cloned()
    }

    /// Insert the user if absent, returning a snapshot either way.
    pub async fn get_or_create(&self, user_id: &str) -> User {
        let mut users = self.users.write().await;
        users
            .entry(user_id.to_string())
            .or_insert_with(|| User::new(user_id.to_string()))
            .clone()
    }

    /// Apply a mutation to a user record, returning the updated snapshot.
    pub async fn update<F>(&self, user_id: &str, f: F) -> Option<User>
    where
        F: FnOnce(&mut User),
    {
        let mut users = self.users.write().await;
        let user = users.get_mut(user_id)?;
        f(user);
        Some(user.clone())
    }

    /// Refresh a user's last-active timestamp.
    pub async fn touch(&self, user_id: &str) {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(user_id) {
            user.last_active = Utc::now();
        }
    }

    pub async fn remove(&self, user_id: &str) -> Option<User> {
        self.users.write().await.remove(user_id)
    }

    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }

    /// Snapshot of all users, for the admin dump and the cleanup sweep.
    pub async fn all(&self) -> Vec<User> {
        self.users.read().await.values().cloned().collect()
    }

    /// Ids of users whose last activity is older than the cutoff.
    pub async fn inactive_since(&self, cutoff: DateTime<Utc>) -> Vec<UserId> {
        self.users
            .read()
            .await
            .values()
            .filter(|u| u.last_active < cutoff)
            .map(|u| u.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = UserStore::new();
        let a = store.get_or_create("u1").await;
        let b = store.get_or_create("u1").await;
        assert_eq!(a.id, b.id);
        assert_eq!(a.username, b.username);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_new_user_has_placeholder_name() {
        let store = UserStore::new();
        let user = store.get_or_create("abcdef123456").await;
        assert_eq!(user.username, "Player-abcdef12");
        assert!(user.room_id.is_none());
        assert!(!user.is_admin);
    }

    #[tokio::test]
    async fn test_update_mutates_snapshot() {
        let store = UserStore::new();
        store.get_or_create("u1").await;
        let updated = store
            .update("u1", |u| {
                u.username = "alice".to_string();
                u.is_admin = true;
            })
            .await
            .unwrap();
        assert_eq!(updated.username, "alice");
        assert!(updated.is_admin);
    }

    #[tokio::test]
    async fn test_inactive_since_filters_by_cutoff() {
        let store = UserStore::new();
        store.get_or_create("old").await;
        store
            .update("old", |u| {
                u.last_active = Utc::now() - chrono::Duration::minutes(10);
            })
            .await;
        store.get_or_create("fresh").await;

        let cutoff = Utc::now() - chrono::Duration::minutes(5);
        let inactive = store.inactive_since(cutoff).await;
        assert_eq!(inactive, vec!["old".to_string()]);
    }
}
