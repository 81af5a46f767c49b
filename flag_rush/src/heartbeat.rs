//! Heartbeat liveness monitoring.
//!
//! One ping task per connection: send `HEARTBEAT{timestamp}`, arm a timeout,
//! and count misses. Enough consecutive misses — or a failed send — queues
//! the user for the disconnect flow. Responses are recorded on the
//! connection by the session router, which also refreshes the user's
//! last-active time.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::broadcast::Broadcaster;
use crate::clock::now_ms;
use crate::conn::{ConnectionRegistry, OutboundFrame};
use crate::net::messages::ServerMessage;
use crate::user::UserId;

#[derive(Clone, Copy, Debug)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    /// How long to wait for a response before counting a miss.
    pub timeout: Duration,
    /// Consecutive misses that count as liveness loss.
    pub max_missed: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            max_missed: 3,
        }
    }
}

/// Owns the per-connection ping tasks.
pub struct HeartbeatMonitor {
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    config: HeartbeatConfig,
    tasks: Mutex<HashMap<UserId, JoinHandle<()>>>,
}

impl HeartbeatMonitor {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        broadcaster: Arc<Broadcaster>,
        config: HeartbeatConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            broadcaster,
            config,
            tasks: Mutex::new(HashMap::new()),
        })
    }

    /// Begin pinging a user's connection. Replaces any previous task, so a
    /// superseding login restarts the schedule cleanly.
    pub async fn start(self: &Arc<Self>, user_id: &str, socket_id: &str) {
        let monitor = self.clone();
        let user = user_id.to_string();
        let socket = socket_id.to_string();
        let handle = tokio::spawn(async move {
            monitor.ping_loop(&user, &socket).await;
        });

        let mut tasks = self.tasks.lock().await;
        if let Some(old) = tasks.insert(user_id.to_string(), handle) {
            old.abort();
        }
    }

    /// Stop pinging a user.
    pub async fn stop(&self, user_id: &str) {
        if let Some(handle) = self.tasks.lock().await.remove(user_id) {
            handle.abort();
        }
    }

    async fn ping_loop(&self, user_id: &str, socket_id: &str) {
        let mut missed: u32 = 0;
        loop {
            tokio::time::sleep(self.config.interval).await;

            let Some(conn) = self.registry.get(user_id).await else {
                return;
            };
            if conn.socket_id != socket_id {
                // A new session took over; its own task is pinging now.
                return;
            }

            let ping_at = now_ms();
            let frame = ServerMessage::Heartbeat { timestamp: ping_at }.to_frame();
            if conn.send(OutboundFrame::Text(frame)).is_err() {
                log::debug!("heartbeat send failed for user {user_id}, dropping");
                self.broadcaster.evict(user_id);
                return;
            }

            tokio::time::sleep(self.config.timeout).await;
            if conn.last_pong_ms() >= ping_at {
                missed = 0;
                continue;
            }

            missed += 1;
            log::debug!("user {user_id} missed heartbeat {missed}/{}", self.config.max_missed);
            if missed >= self.config.max_missed {
                log::info!("user {user_id} lost liveness, disconnecting");
                self.broadcaster.evict(user_id);
                return;
            }
        }
    }
}
