//! Per-room timer registry.
//!
//! Timers are one-shot tasks keyed by room id, held outside the room record
//! so room state stays pure data. At most one timer exists per room: the
//! question deadline or the inter-round delay, never both. A fired timer
//! removes its own registration before running its callback; a fired-but-
//! cancelled transition becomes a no-op through the engine's liveness checks.

use std::collections::HashMap;
use std::future::Future;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::room::RoomId;

#[derive(Default)]
pub struct TimerRegistry {
    tasks: Mutex<HashMap<RoomId, JoinHandle<()>>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `callback` to run after `delay`, replacing (and cancelling)
    /// any timer already registered for the room.
    pub async fn schedule<F>(self: &std::sync::Arc<Self>, room_id: RoomId, delay: Duration, callback: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let registry = self.clone();
        let key = room_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Drop our own registration first: the callback may schedule the
            // next timer for this room and must not abort itself.
            registry.tasks.lock().await.remove(&key);
            callback.await;
        });

        let mut tasks = self.tasks.lock().await;
        if let Some(old) = tasks.insert(room_id, handle) {
            old.abort();
        }
    }

    /// Cancel the room's pending timer, if any.
    pub async fn cancel(&self, room_id: &str) {
        if let Some(handle) = self.tasks.lock().await.remove(room_id) {
            handle.abort();
        }
    }

    /// True if a timer is currently registered for the room.
    pub async fn has_timer(&self, room_id: &str) -> bool {
        self.tasks.lock().await.contains_key(room_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_timer_fires_and_unregisters() {
        let registry = Arc::new(TimerRegistry::new());
        let fired = Arc::new(AtomicU32::new(0));

        let counter = fired.clone();
        registry
            .schedule("room".to_string(), Duration::from_millis(10), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        assert!(registry.has_timer("room").await);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!registry.has_timer("room").await);
    }

    #[tokio::test]
    async fn test_cancel_prevents_firing() {
        let registry = Arc::new(TimerRegistry::new());
        let fired = Arc::new(AtomicU32::new(0));

        let counter = fired.clone();
        registry
            .schedule("room".to_string(), Duration::from_millis(20), async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        registry.cancel("room").await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!registry.has_timer("room").await);
    }

    #[tokio::test]
    async fn test_reschedule_replaces_pending_timer() {
        let registry = Arc::new(TimerRegistry::new());
        let fired = Arc::new(AtomicU32::new(0));

        let first = fired.clone();
        registry
            .schedule("room".to_string(), Duration::from_millis(20), async move {
                first.fetch_add(10, Ordering::SeqCst);
            })
            .await;
        let second = fired.clone();
        registry
            .schedule("room".to_string(), Duration::from_millis(20), async move {
                second.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1, "only the second fires");
    }

    #[tokio::test]
    async fn test_rooms_are_independent() {
        let registry = Arc::new(TimerRegistry::new());
        let fired = Arc::new(AtomicU32::new(0));

        for room in ["a", "b"] {
            let counter = fired.clone();
            registry
                .schedule(room.to_string(), Duration::from_millis(10), async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .await;
        }
        registry.cancel("a").await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
