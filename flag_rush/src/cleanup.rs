//! Periodic housekeeping: inactive users, empty rooms, and room TTLs.
//!
//! Each sweep runs its sub-sweeps independently so one failure cannot stop
//! the others, and logs per-cycle counts. Cleanup only ever removes state —
//! it never creates rooms or users.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::broadcast::Broadcaster;
use crate::constants::ROOM_TTL_WARNING_SECS;
use crate::game::engine::GameEngine;
use crate::net::messages::ServerMessage;
use crate::room::RoomStore;
use crate::security::RateLimiter;
use crate::session::SessionRouter;
use crate::user::UserStore;

#[derive(Clone, Copy, Debug)]
pub struct CleanupConfig {
    pub interval: Duration,
    /// Users idle beyond this are removed from their rooms and deleted.
    pub inactive_user_timeout: ChronoDuration,
    /// Rooms empty beyond this are deleted.
    pub empty_room_timeout: ChronoDuration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            inactive_user_timeout: ChronoDuration::minutes(5),
            empty_room_timeout: ChronoDuration::minutes(10),
        }
    }
}

/// The periodic sweeper.
pub struct CleanupService {
    users: Arc<UserStore>,
    rooms: Arc<RoomStore>,
    broadcaster: Arc<Broadcaster>,
    engine: Arc<GameEngine>,
    router: Arc<SessionRouter>,
    limiter: Arc<RateLimiter>,
    config: CleanupConfig,
}

impl CleanupService {
    pub fn new(
        users: Arc<UserStore>,
        rooms: Arc<RoomStore>,
        broadcaster: Arc<Broadcaster>,
        engine: Arc<GameEngine>,
        router: Arc<SessionRouter>,
        limiter: Arc<RateLimiter>,
        config: CleanupConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            users,
            rooms,
            broadcaster,
            engine,
            router,
            limiter,
            config,
        })
    }

    /// Spawn the sweep loop. Aborted at shutdown.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(service.config.interval);
            // The immediate first tick would sweep an empty server.
            interval.tick().await;
            loop {
                interval.tick().await;
                service.sweep().await;
            }
        })
    }

    /// One full sweep. Public so tests can drive it directly.
    pub async fn sweep(&self) {
        let inactive = self.sweep_inactive_users().await;
        let empty = self.sweep_empty_rooms().await;
        let expired = self.sweep_room_ttls().await;
        let pruned = self.limiter.prune().await;
        log::info!(
            "cleanup cycle: {inactive} inactive user(s), {empty} empty room(s), \
             {expired} expired room(s), {pruned} rate counter(s) pruned"
        );
    }

    /// Users idle past the timeout are disconnected and deleted.
    async fn sweep_inactive_users(&self) -> usize {
        let cutoff = Utc::now() - self.config.inactive_user_timeout;
        let stale = self.users.inactive_since(cutoff).await;
        let count = stale.len();
        for user_id in stale {
            log::debug!("removing inactive user {user_id}");
            self.router.handle_disconnect(&user_id).await;
        }
        count
    }

    /// Rooms that have sat empty past the timeout are deleted. The
    /// disconnect flow already deletes drained rooms, so this is the safety
    /// net for rooms that slipped through.
    async fn sweep_empty_rooms(&self) -> usize {
        let cutoff = Utc::now() - self.config.empty_room_timeout;
        let mut removed = 0;
        for handle in self.rooms.all().await {
            let room_id = {
                let mut room = handle.lock().await;
                if !room.members.is_empty() {
                    continue;
                }
                match room.emptied_at {
                    Some(at) if at < cutoff => {
                        self.engine.halt(&mut room).await;
                        room.id.clone()
                    }
                    _ => continue,
                }
            };
            self.rooms.remove(&room_id).await;
            removed += 1;
        }
        removed
    }

    /// TTL enforcement: warn rooms in their final window, purge rooms past
    /// their lifetime (stopping any active game first).
    async fn sweep_room_ttls(&self) -> usize {
        let now = Utc::now();
        let mut expired = 0;
        for handle in self.rooms.all().await {
            let action = {
                let mut room = handle.lock().await;
                let expires_at = room.expires_at();
                let remaining_ms = (expires_at - now).num_milliseconds();

                if remaining_ms <= 0 {
                    self.engine.halt(&mut room).await;
                    TtlAction::Expire {
                        room_id: room.id.clone(),
                        member_ids: room.member_ids(),
                    }
                } else if remaining_ms <= ROOM_TTL_WARNING_SECS * 1000 && !room.ttl_warned {
                    room.ttl_warned = true;
                    TtlAction::Warn {
                        room_id: room.id.clone(),
                        member_ids: room.member_ids(),
                        expires_at: expires_at.timestamp_millis(),
                        remaining_ms,
                    }
                } else {
                    TtlAction::None
                }
            };

            match action {
                TtlAction::Expire { room_id, member_ids } => {
                    self.broadcaster
                        .to_members(
                            &member_ids,
                            &ServerMessage::RoomExpired {
                                room_id: room_id.clone(),
                            },
                        )
                        .await;
                    for user_id in &member_ids {
                        self.users
                            .update(user_id, |u| {
                                u.room_id = None;
                                u.is_admin = false;
                            })
                            .await;
                    }
                    self.rooms.remove(&room_id).await;
                    log::info!("room {room_id} expired after reaching its lifetime");
                    expired += 1;
                }
                TtlAction::Warn {
                    room_id,
                    member_ids,
                    expires_at,
                    remaining_ms,
                } => {
                    self.broadcaster
                        .to_members(
                            &member_ids,
                            &ServerMessage::RoomTtlWarning {
                                room_id,
                                expires_at,
                                remaining_ms,
                            },
                        )
                        .await;
                }
                TtlAction::None => {}
            }
        }
        expired
    }
}

enum TtlAction {
    None,
    Warn {
        room_id: String,
        member_ids: Vec<String>,
        expires_at: i64,
        remaining_ms: i64,
    },
    Expire {
        room_id: String,
        member_ids: Vec<String>,
    },
}
