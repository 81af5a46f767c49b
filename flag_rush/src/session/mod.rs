//! Session router: per-message dispatch and the connection lifecycle.
//!
//! The transport hands three events to this module — open, message, close —
//! and everything else happens here: user record creation, connection
//! install with supersede, room hydration, the inbound payload ceiling, rate
//! limiting, structural validation, handler dispatch, and the disconnect
//! flow with host succession. Handlers own the policy checks (host-only,
//! phase constraints); the validator stays structural.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::broadcast::Broadcaster;
use crate::clock::now_ms;
use crate::conn::{ClientConnection, ConnectionRegistry};
use crate::constants::{
    CLOSE_MESSAGE_TOO_LARGE, CLOSE_NORMAL, CLOSE_SUPERSEDED, MAX_INBOUND_FRAME_BYTES,
};
use crate::errors::{AppError, AppResult, ErrorKind};
use crate::game::engine::GameEngine;
use crate::heartbeat::HeartbeatMonitor;
use crate::net::messages::{
    CreateRoomPayload, JoinRoomPayload, KickUserPayload, RawFrame, ServerMessage,
    SubmitAnswerPayload,
};
use crate::room::{RoomId, RoomSettings, RoomStore, RoomView, SettingsPatch};
use crate::security::RateLimiter;
use crate::user::{UserId, UserStore};
use crate::validate;

const MAX_ROOM_NAME_LEN: usize = 50;

/// Routes everything a live session does.
pub struct SessionRouter {
    users: Arc<UserStore>,
    rooms: Arc<RoomStore>,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    engine: Arc<GameEngine>,
    heartbeats: Arc<HeartbeatMonitor>,
    limiter: Arc<RateLimiter>,
}

impl SessionRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<UserStore>,
        rooms: Arc<RoomStore>,
        registry: Arc<ConnectionRegistry>,
        broadcaster: Arc<Broadcaster>,
        engine: Arc<GameEngine>,
        heartbeats: Arc<HeartbeatMonitor>,
        limiter: Arc<RateLimiter>,
    ) -> Arc<Self> {
        Arc::new(Self {
            users,
            rooms,
            registry,
            broadcaster,
            engine,
            heartbeats,
            limiter,
        })
    }

    /// Drain the eviction queue, running the disconnect flow for each dead
    /// connection outside any broadcast.
    pub fn spawn_harvester(
        self: &Arc<Self>,
        mut evict_rx: mpsc::UnboundedReceiver<UserId>,
    ) -> JoinHandle<()> {
        let router = self.clone();
        tokio::spawn(async move {
            while let Some(user_id) = evict_rx.recv().await {
                router.handle_disconnect(&user_id).await;
            }
        })
    }

    /// A freshly upgraded, already authenticated connection.
    ///
    /// Creates the user record if absent, installs the connection (closing a
    /// superseded session with 4000), starts the heartbeat, hydrates room
    /// membership, and answers with AUTH_SUCCESS.
    pub async fn on_open(self: &Arc<Self>, conn: Arc<ClientConnection>) {
        let user_id = conn.user_id.clone();
        self.users.get_or_create(&user_id).await;
        self.users
            .update(&user_id, |u| {
                u.socket_id = Some(conn.socket_id.clone());
                u.last_active = chrono::Utc::now();
            })
            .await;

        if let Some(old) = self.registry.install(conn.clone()).await {
            log::info!("user {user_id} logged in again, superseding old session");
            old.mark_superseded();
            old.close(CLOSE_SUPERSEDED, "superseded by new session");
        }
        self.heartbeats.start(&user_id, &conn.socket_id).await;

        let room = self.hydrate_room(&user_id).await;
        let Some(user) = self.users.get(&user_id).await else {
            return;
        };
        let message = ServerMessage::AuthSuccess {
            user_id: user_id.clone(),
            is_admin: user.is_admin,
            user,
            room,
        };
        self.broadcaster.to_user(&user_id, &message).await;
        log::info!("session opened for user {user_id} from {}", conn.ip_address);
    }

    /// One inbound frame.
    pub async fn on_message(self: &Arc<Self>, conn: &Arc<ClientConnection>, text: &str) {
        let user_id = conn.user_id.clone();

        if text.len() > MAX_INBOUND_FRAME_BYTES {
            log::warn!("user {user_id} sent an oversized frame ({} bytes)", text.len());
            conn.close(CLOSE_MESSAGE_TOO_LARGE, "message too large");
            self.broadcaster.evict(&user_id);
            return;
        }

        if text.trim().is_empty() {
            self.send_error(
                &user_id,
                &AppError::new(ErrorKind::WebsocketMessageError, "empty message"),
            )
            .await;
            return;
        }

        let frame: RawFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("user {user_id} sent unparseable frame: {e}");
                self.send_error(
                    &user_id,
                    &AppError::new(ErrorKind::WebsocketMessageError, "malformed message"),
                )
                .await;
                return;
            }
        };

        self.users.touch(&user_id).await;

        // Per-action rate limits, scoped to the user.
        if let Err(err) = self.limiter.check(&frame.kind, &user_id).await {
            self.send_error(&user_id, &err).await;
            return;
        }

        let result = match frame.kind.as_str() {
            "CREATE_ROOM" => match parse_payload::<CreateRoomPayload>(frame.data) {
                Ok(payload) => self.handle_create_room(&user_id, payload).await,
                Err(err) => Err(err),
            },
            "JOIN_ROOM" => match parse_payload::<JoinRoomPayload>(frame.data) {
                Ok(payload) => self.handle_join_room(&user_id, payload).await,
                Err(err) => Err(err),
            },
            "LEAVE_ROOM" => self.handle_leave_room(&user_id).await,
            "SUBMIT_ANSWER" => match parse_payload::<SubmitAnswerPayload>(frame.data) {
                Ok(payload) => self.handle_submit_answer(&user_id, payload).await,
                Err(err) => Err(err),
            },
            "UPDATE_ROOM_SETTINGS" => match parse_payload::<SettingsPatch>(frame.data) {
                Ok(patch) => self.handle_update_settings(&user_id, patch).await,
                Err(err) => Err(err),
            },
            "KICK_USER" => match parse_payload::<KickUserPayload>(frame.data) {
                Ok(payload) => self.handle_kick_user(&user_id, payload).await,
                Err(err) => Err(err),
            },
            "START_GAME" => match self.current_room_id(&user_id).await {
                Ok(room_id) => self.engine.start_game(&room_id, &user_id).await,
                Err(err) => Err(err),
            },
            "STOP_GAME" => match self.current_room_id(&user_id).await {
                Ok(room_id) => self.engine.stop_game(&room_id, &user_id).await,
                Err(err) => Err(err),
            },
            "RESTART_GAME" => match self.current_room_id(&user_id).await {
                Ok(room_id) => self.engine.restart_game(&room_id, &user_id).await,
                Err(err) => Err(err),
            },
            "HEARTBEAT_RESPONSE" => {
                conn.record_pong(now_ms());
                Ok(())
            }
            other => {
                // Unknown types are dropped silently.
                log::debug!("user {user_id} sent unknown message type {other}");
                Ok(())
            }
        };

        if let Err(err) = result {
            self.send_error(&user_id, &err).await;
        }
    }

    /// The socket closed. A superseded session only drops its own stale
    /// registration; a current session runs the disconnect flow.
    pub async fn on_close(self: &Arc<Self>, conn: &Arc<ClientConnection>) {
        let user_id = conn.user_id.clone();
        if conn.is_superseded() {
            self.registry.remove_if_socket(&user_id, &conn.socket_id).await;
            return;
        }
        if !self.registry.remove_if_socket(&user_id, &conn.socket_id).await {
            // Another socket already replaced this one.
            return;
        }
        self.handle_disconnect(&user_id).await;
    }

    /// Tear down a user: leave their room (with host succession), delete the
    /// user record, and drop the connection.
    pub async fn handle_disconnect(self: &Arc<Self>, user_id: &str) {
        let user = self.users.get(user_id).await;
        if let Some(room_id) = user.and_then(|u| u.room_id) {
            self.remove_from_room(user_id, &room_id).await;
        }

        self.users.remove(user_id).await;
        self.heartbeats.stop(user_id).await;
        if let Some(conn) = self.registry.remove(user_id).await {
            conn.close(CLOSE_NORMAL, "disconnected");
        }
        log::info!("user {user_id} disconnected");
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    async fn handle_create_room(
        self: &Arc<Self>,
        user_id: &UserId,
        payload: CreateRoomPayload,
    ) -> AppResult<()> {
        let username = validate::username(&payload.username)?;
        let settings = match payload.settings {
            Some(patch) => {
                validate::settings_patch(&patch)?;
                RoomSettings::default().apply(&patch)?
            }
            None => RoomSettings::default(),
        };
        let name = room_name(payload.room_name.as_deref(), &username)?;

        let user = self.users.get(user_id).await.ok_or_else(AppError::user_not_found)?;
        if user.room_id.is_some() {
            return Err(AppError::new(
                ErrorKind::UserAlreadyInRoom,
                "leave your current room first",
            ));
        }

        let handle = self.rooms.create(user_id, &username, name, settings).await?;
        let view = handle.lock().await.view();

        self.users
            .update(user_id, |u| {
                u.username = username.clone();
                u.room_id = Some(view.id.clone());
                u.is_admin = true;
            })
            .await;

        self.broadcaster
            .to_user(user_id, &ServerMessage::CreateRoomSuccess { room: view })
            .await;
        Ok(())
    }

    async fn handle_join_room(
        self: &Arc<Self>,
        user_id: &UserId,
        payload: JoinRoomPayload,
    ) -> AppResult<()> {
        let code = validate::invite_code(&payload.invite_code)?;
        let username = validate::username(&payload.username)?;

        let user = self.users.get(user_id).await.ok_or_else(AppError::user_not_found)?;
        if user.room_id.is_some() {
            return Err(AppError::new(
                ErrorKind::UserAlreadyInRoom,
                "leave your current room first",
            ));
        }

        let handle = self
            .rooms
            .find_by_invite(&code)
            .await
            .ok_or_else(AppError::room_not_found)?;

        let (view, member, other_members) = {
            let mut room = handle.lock().await;
            room.add_member(user_id, &username)?;
            let member = room
                .member(user_id)
                .cloned()
                .expect("member just added");
            let others: Vec<UserId> = room
                .member_ids()
                .into_iter()
                .filter(|id| id != user_id)
                .collect();
            (room.view(), member, others)
        };

        self.users
            .update(user_id, |u| {
                u.username = username.clone();
                u.room_id = Some(view.id.clone());
                u.is_admin = false;
            })
            .await;

        self.broadcaster
            .to_user(
                user_id,
                &ServerMessage::JoinRoomSuccess { room: view.clone() },
            )
            .await;
        self.broadcaster
            .to_members(
                &other_members,
                &ServerMessage::UserJoined { user: member, room: view },
            )
            .await;
        Ok(())
    }

    async fn handle_leave_room(self: &Arc<Self>, user_id: &UserId) -> AppResult<()> {
        let room_id = self.current_room_id(user_id).await?;
        self.remove_from_room(user_id, &room_id).await;
        self.users
            .update(user_id, |u| {
                u.room_id = None;
                u.is_admin = false;
            })
            .await;
        Ok(())
    }

    async fn handle_submit_answer(
        self: &Arc<Self>,
        user_id: &UserId,
        payload: SubmitAnswerPayload,
    ) -> AppResult<()> {
        let answer = validate::answer(&payload.answer)?;
        let room_id = self.current_room_id(user_id).await?;
        self.engine.submit_answer(&room_id, user_id, &answer).await
    }

    async fn handle_update_settings(
        self: &Arc<Self>,
        user_id: &UserId,
        patch: SettingsPatch,
    ) -> AppResult<()> {
        use crate::game::GamePhase;

        validate::settings_patch(&patch)?;
        let room_id = self.current_room_id(user_id).await?;
        let handle = self.rooms.get(&room_id).await.ok_or_else(AppError::room_not_found)?;

        let (settings, member_ids) = {
            let mut room = handle.lock().await;
            if room.host != *user_id {
                return Err(AppError::permission_denied("host only"));
            }
            if !matches!(room.game.phase, GamePhase::Waiting | GamePhase::Finished) {
                return Err(AppError::invalid_game_state(
                    "settings are locked while a game is running",
                ));
            }
            if let Some(size) = patch.max_room_size
                && size < room.members.len()
            {
                return Err(AppError::invalid_input(
                    "maxRoomSize cannot be below the current member count",
                ));
            }
            room.settings = room.settings.apply(&patch)?;
            (room.settings, room.member_ids())
        };

        self.broadcaster
            .to_members(&member_ids, &ServerMessage::SettingsUpdated { settings })
            .await;
        Ok(())
    }

    async fn handle_kick_user(
        self: &Arc<Self>,
        user_id: &UserId,
        payload: KickUserPayload,
    ) -> AppResult<()> {
        let target_id = payload.user_id;
        if target_id == *user_id {
            return Err(AppError::invalid_input("cannot kick yourself"));
        }

        let room_id = self.current_room_id(user_id).await?;
        let handle = self.rooms.get(&room_id).await.ok_or_else(AppError::room_not_found)?;

        let (username, remaining) = {
            let mut room = handle.lock().await;
            if room.host != *user_id {
                return Err(AppError::permission_denied("host only"));
            }
            let Some(removed) = room.remove_member(&target_id) else {
                return Err(AppError::user_not_found());
            };
            room.kicked_users.insert(target_id.clone());
            (removed.username, room.member_ids())
        };

        self.users
            .update(&target_id, |u| {
                u.room_id = None;
                u.is_admin = false;
            })
            .await;

        self.broadcaster
            .to_members(
                &remaining,
                &ServerMessage::UserKicked {
                    user_id: target_id.clone(),
                    username,
                },
            )
            .await;
        self.broadcaster
            .to_user(
                &target_id,
                &ServerMessage::Kicked {
                    reason: "removed by the host".to_string(),
                },
            )
            .await;

        // Then disconnect the target.
        if let Some(conn) = self.registry.get(&target_id).await {
            conn.close(CLOSE_NORMAL, "kicked");
        }
        self.broadcaster.evict(&target_id);
        log::info!("user {target_id} kicked from room {room_id} by {user_id}");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Shared flows
    // ------------------------------------------------------------------

    /// Detach a user from a room: host succession, USER_LEFT, and teardown
    /// of a drained room.
    async fn remove_from_room(self: &Arc<Self>, user_id: &str, room_id: &str) {
        let Some(handle) = self.rooms.get(room_id).await else {
            return;
        };

        let delete_room = {
            let mut room = handle.lock().await;
            if room.remove_member(user_id).is_none() {
                return;
            }
            let was_host = room.host == user_id;

            if room.members.is_empty() {
                self.engine.halt(&mut room).await;
                true
            } else {
                if was_host
                    && let Some(new_host) = room.promote_next_host()
                {
                    self.users
                        .update(&new_host, |u| {
                            u.is_admin = true;
                        })
                        .await;
                    self.broadcaster
                        .to_members(
                            &room.member_ids(),
                            &ServerMessage::HostChanged {
                                new_host: new_host.clone(),
                            },
                        )
                        .await;
                    log::info!("room {room_id}: host succession to {new_host}");
                }
                self.broadcaster
                    .to_members(
                        &room.member_ids(),
                        &ServerMessage::UserLeft {
                            user_id: user_id.to_string(),
                            room: room.view(),
                        },
                    )
                    .await;
                false
            }
        };

        if delete_room {
            self.rooms.remove(room_id).await;
        }
    }

    /// Reattach a reconnecting user to their room.
    ///
    /// If the stored `roomId` still names a live room containing them, use
    /// it; otherwise, if they host a live room, rejoin as a member and
    /// correct the stored binding.
    async fn hydrate_room(self: &Arc<Self>, user_id: &str) -> Option<RoomView> {
        let user = self.users.get(user_id).await?;

        if let Some(room_id) = &user.room_id {
            if let Some(handle) = self.rooms.get(room_id).await {
                let room = handle.lock().await;
                if room.has_member(user_id) {
                    return Some(room.view());
                }
            }
            // Stale binding.
            self.users
                .update(user_id, |u| {
                    u.room_id = None;
                    u.is_admin = false;
                })
                .await;
        }

        let handle = self.rooms.find_hosted_by(user_id).await?;
        let view = {
            let mut room = handle.lock().await;
            if !room.has_member(user_id) {
                room.add_member(user_id, &user.username).ok()?;
            }
            room.view()
        };
        self.users
            .update(user_id, |u| {
                u.room_id = Some(view.id.clone());
                u.is_admin = true;
            })
            .await;
        Some(view)
    }

    async fn current_room_id(&self, user_id: &str) -> AppResult<RoomId> {
        self.users
            .get(user_id)
            .await
            .and_then(|u| u.room_id)
            .ok_or_else(|| AppError::invalid_input("not in a room"))
    }

    async fn send_error(&self, user_id: &str, err: &AppError) {
        self.broadcaster
            .to_user(user_id, &ServerMessage::error(err))
            .await;
    }
}

/// Deserialize an action payload. A shape mismatch is a validation error,
/// not a dropped frame.
fn parse_payload<P: serde::de::DeserializeOwned>(
    data: Option<serde_json::Value>,
) -> AppResult<P> {
    serde_json::from_value(data.unwrap_or(serde_json::Value::Null))
        .map_err(|e| AppError::validation(format!("invalid payload: {e}")))
}

/// Sanitize an optional room name, defaulting to "<username>'s Room".
fn room_name(raw: Option<&str>, username: &str) -> AppResult<String> {
    match raw {
        Some(value) => {
            let cleaned: String = value
                .chars()
                .filter(|c| !matches!(c, '<' | '>' | '\'' | '"' | '&'))
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if cleaned.is_empty() || cleaned.chars().count() > MAX_ROOM_NAME_LEN {
                return Err(AppError::validation(format!(
                    "room name must be 1-{MAX_ROOM_NAME_LEN} characters"
                )));
            }
            Ok(cleaned)
        }
        None => Ok(format!("{username}'s Room")),
    }
}
