//! Live connection registry.
//!
//! A [`ClientConnection`] is the ephemeral binding of a socket to a user: an
//! outbound frame queue with a buffered-byte counter, plus the flags the
//! lifecycle needs (open, superseded). The socket itself lives in the server
//! crate; its writer task drains the queue, which keeps all engine-side sends
//! non-blocking and preserves per-member FIFO ordering.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::user::UserId;

/// A frame queued for the socket writer.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundFrame {
    Text(String),
    /// Close the socket with a code and reason, then stop writing.
    Close { code: u16, reason: String },
}

impl OutboundFrame {
    /// Approximate wire size, used for the backpressure counter.
    pub fn len(&self) -> usize {
        match self {
            OutboundFrame::Text(text) => text.len(),
            OutboundFrame::Close { reason, .. } => reason.len() + 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One live client session.
pub struct ClientConnection {
    pub user_id: UserId,
    /// Ephemeral socket id, fresh per connection.
    pub socket_id: String,
    pub ip_address: String,
    tx: mpsc::UnboundedSender<OutboundFrame>,
    buffered_bytes: AtomicUsize,
    open: AtomicBool,
    closed_by_new_session: AtomicBool,
    /// Wall-clock ms of the last heartbeat response.
    last_pong_ms: AtomicI64,
}

impl ClientConnection {
    /// Create a connection and the receiver its socket writer drains.
    pub fn new(
        user_id: UserId,
        ip_address: String,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Self {
            user_id,
            socket_id: Uuid::new_v4().to_string(),
            ip_address,
            tx,
            buffered_bytes: AtomicUsize::new(0),
            open: AtomicBool::new(true),
            closed_by_new_session: AtomicBool::new(false),
            last_pong_ms: AtomicI64::new(crate::clock::now_ms()),
        });
        (conn, rx)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Bytes queued but not yet written to the socket.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes.load(Ordering::Acquire)
    }

    /// Called by the socket writer after a frame is flushed.
    pub fn frame_written(&self, len: usize) {
        self.buffered_bytes.fetch_sub(len, Ordering::AcqRel);
    }

    /// Enqueue a frame. Fails if the connection is closed or the writer is
    /// gone.
    pub fn send(&self, frame: OutboundFrame) -> Result<(), ()> {
        if !self.is_open() {
            return Err(());
        }
        self.buffered_bytes.fetch_add(frame.len(), Ordering::AcqRel);
        self.tx.send(frame).map_err(|_| ())
    }

    /// Enqueue a close frame and mark the connection closed. Idempotent.
    pub fn close(&self, code: u16, reason: &str) {
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.tx.send(OutboundFrame::Close {
                code,
                reason: reason.to_string(),
            });
        }
    }

    pub fn mark_superseded(&self) {
        self.closed_by_new_session.store(true, Ordering::Release);
    }

    pub fn is_superseded(&self) -> bool {
        self.closed_by_new_session.load(Ordering::Acquire)
    }

    pub fn record_pong(&self, at_ms: i64) {
        self.last_pong_ms.store(at_ms, Ordering::Release);
    }

    pub fn last_pong_ms(&self) -> i64 {
        self.last_pong_ms.load(Ordering::Acquire)
    }
}

/// Registry of live connections keyed by user id. One connection per user; a
/// new login supersedes the old session.
#[derive(Default)]
pub struct ConnectionRegistry {
    conns: tokio::sync::RwLock<std::collections::HashMap<UserId, Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a connection, returning the superseded one if present. The
    /// caller finishes the supersede (close 4000, stop heartbeat).
    pub async fn install(&self, conn: Arc<ClientConnection>) -> Option<Arc<ClientConnection>> {
        let mut conns = self.conns.write().await;
        conns.insert(conn.user_id.clone(), conn)
    }

    pub async fn get(&self, user_id: &str) -> Option<Arc<ClientConnection>> {
        self.conns.read().await.get(user_id).cloned()
    }

    /// Remove the user's connection record.
    pub async fn remove(&self, user_id: &str) -> Option<Arc<ClientConnection>> {
        self.conns.write().await.remove(user_id)
    }

    /// Remove only if the registered connection is this exact socket. Used
    /// by close handling so a superseded session cannot evict its successor.
    pub async fn remove_if_socket(&self, user_id: &str, socket_id: &str) -> bool {
        let mut conns = self.conns.write().await;
        if conns.get(user_id).is_some_and(|c| c.socket_id == socket_id) {
            conns.remove(user_id);
            true
        } else {
            false
        }
    }

    pub async fn count(&self) -> usize {
        self.conns.read().await.len()
    }

    pub async fn user_ids(&self) -> Vec<UserId> {
        self.conns.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_tracks_buffered_bytes() {
        let (conn, mut rx) = ClientConnection::new("u1".to_string(), "127.0.0.1".to_string());
        conn.send(OutboundFrame::Text("hello".to_string())).unwrap();
        assert_eq!(conn.buffered_bytes(), 5);

        let frame = rx.try_recv().unwrap();
        conn.frame_written(frame.len());
        assert_eq!(conn.buffered_bytes(), 0);
    }

    #[test]
    fn test_close_is_idempotent_and_stops_sends() {
        let (conn, mut rx) = ClientConnection::new("u1".to_string(), "127.0.0.1".to_string());
        conn.close(4000, "superseded");
        conn.close(4000, "superseded");
        assert!(!conn.is_open());
        assert!(conn.send(OutboundFrame::Text("x".to_string())).is_err());

        // Exactly one close frame was queued.
        assert!(matches!(
            rx.try_recv().unwrap(),
            OutboundFrame::Close { code: 4000, .. }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_install_returns_superseded_connection() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = ClientConnection::new("u1".to_string(), "127.0.0.1".to_string());
        let (second, _rx2) = ClientConnection::new("u1".to_string(), "127.0.0.1".to_string());

        assert!(registry.install(first.clone()).await.is_none());
        let old = registry.install(second.clone()).await.unwrap();
        assert_eq!(old.socket_id, first.socket_id);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_remove_if_socket_spares_successor() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = ClientConnection::new("u1".to_string(), "127.0.0.1".to_string());
        let (second, _rx2) = ClientConnection::new("u1".to_string(), "127.0.0.1".to_string());
        registry.install(first.clone()).await;
        registry.install(second.clone()).await;

        // Stale close from the first socket must not remove the second.
        assert!(!registry.remove_if_socket("u1", &first.socket_id).await);
        assert!(registry.get("u1").await.is_some());
        assert!(registry.remove_if_socket("u1", &second.socket_id).await);
        assert!(registry.get("u1").await.is_none());
    }
}
