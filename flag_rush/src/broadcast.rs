//! Room- and user-scoped fan-out.
//!
//! All sends are enqueue-only: frames go onto the per-connection queue and
//! the socket writer does the I/O, so broadcasting is safe while a room lock
//! is held and per-member ordering follows enqueue order. Peers whose
//! connection is gone, errored, or over the backpressure ceiling are pushed
//! onto the eviction queue; a harvester task runs the disconnect flow for
//! them outside any broadcast.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::conn::{ConnectionRegistry, OutboundFrame};
use crate::constants::{CLOSE_BACKPRESSURE, MAX_OUTBOUND_BUFFER_BYTES};
use crate::net::messages::ServerMessage;
use crate::room::RoomStore;
use crate::user::UserId;

/// Fan-out over the connection registry.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomStore>,
    evict_tx: mpsc::UnboundedSender<UserId>,
}

impl Broadcaster {
    /// Build the broadcaster and the eviction queue it feeds.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        rooms: Arc<RoomStore>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<UserId>) {
        let (evict_tx, evict_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                registry,
                rooms,
                evict_tx,
            }),
            evict_rx,
        )
    }

    /// Send to one user, harvesting the connection on any failure.
    pub async fn to_user(&self, user_id: &str, message: &ServerMessage) {
        self.safe_send(user_id, &message.to_frame()).await;
    }

    /// Send to every member of a room except `exclude`. Looks the room up
    /// and snapshots its member list; do not call while holding that room's
    /// lock — use [`Broadcaster::to_members`] from engine code.
    pub async fn to_room(&self, room_id: &str, message: &ServerMessage, exclude: &[&str]) {
        let Some(handle) = self.rooms.get(room_id).await else {
            return;
        };
        let member_ids = handle.lock().await.member_ids();
        let frame = message.to_frame();
        for user_id in member_ids {
            if !exclude.contains(&user_id.as_str()) {
                self.safe_send(&user_id, &frame).await;
            }
        }
    }

    /// Send to an explicit member snapshot. Safe under a room lock because
    /// only the connection registry is touched.
    pub async fn to_members(&self, member_ids: &[UserId], message: &ServerMessage) {
        let frame = message.to_frame();
        for user_id in member_ids {
            self.safe_send(user_id, &frame).await;
        }
    }

    /// Send to every live connection.
    pub async fn to_all(&self, message: &ServerMessage) {
        let frame = message.to_frame();
        for user_id in self.registry.user_ids().await {
            self.safe_send(&user_id, &frame).await;
        }
    }

    /// Queue a user for the disconnect flow.
    pub fn evict(&self, user_id: &str) {
        let _ = self.evict_tx.send(user_id.to_string());
    }

    /// Deliver one frame, enforcing the backpressure ceiling. Any failure
    /// queues the peer for harvesting; the send never blocks.
    async fn safe_send(&self, user_id: &str, frame: &str) {
        let Some(conn) = self.registry.get(user_id).await else {
            self.evict(user_id);
            return;
        };

        if !conn.is_open() {
            self.evict(user_id);
            return;
        }

        if conn.buffered_bytes() > MAX_OUTBOUND_BUFFER_BYTES {
            log::warn!(
                "closing connection of user {user_id}: outbound buffer at {} bytes",
                conn.buffered_bytes()
            );
            conn.close(CLOSE_BACKPRESSURE, "outbound buffer overflow");
            self.evict(user_id);
            return;
        }

        if conn.send(OutboundFrame::Text(frame.to_string())).is_err() {
            self.evict(user_id);
        }
    }
}
