//! Per-IP upgrade admission: concurrent connection caps, rapid-connect
//! tracking, and the suspicious set.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Rolling window for rapid-connect counting.
const RAPID_WINDOW: Duration = Duration::from_secs(60);
/// Attempts allowed inside the window; one more marks the IP suspicious.
const RAPID_LIMIT: usize = 3;

/// Why an upgrade was refused, in the order the checks run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpgradeDenial {
    /// IP previously exceeded the rapid-connect limit.
    Suspicious,
    /// Concurrent connection cap reached.
    TooManyConnections,
    /// Too many attempts in the rolling window; IP is now suspicious.
    RapidConnect,
}

#[derive(Default)]
struct GuardState {
    active: HashMap<String, usize>,
    attempts: HashMap<String, VecDeque<Instant>>,
    suspicious: HashSet<String>,
}

/// Tracks connection pressure per source IP.
pub struct IpGuard {
    max_per_ip: usize,
    state: Mutex<GuardState>,
}

impl IpGuard {
    pub fn new(max_per_ip: usize) -> Self {
        Self {
            max_per_ip,
            state: Mutex::new(GuardState::default()),
        }
    }

    /// Admit or refuse an upgrade attempt. Checks run in order: suspicious
    /// set, concurrent cap, rapid-connect window. Admission reserves a
    /// concurrent slot; callers must pair it with [`IpGuard::release`].
    pub async fn admit(&self, ip: &str) -> Result<(), UpgradeDenial> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        if state.suspicious.contains(ip) {
            return Err(UpgradeDenial::Suspicious);
        }

        if state.active.get(ip).copied().unwrap_or(0) >= self.max_per_ip {
            return Err(UpgradeDenial::TooManyConnections);
        }

        let attempts = state.attempts.entry(ip.to_string()).or_default();
        while let Some(first) = attempts.front() {
            if now.duration_since(*first) > RAPID_WINDOW {
                attempts.pop_front();
            } else {
                break;
            }
        }
        attempts.push_back(now);
        if attempts.len() > RAPID_LIMIT {
            state.suspicious.insert(ip.to_string());
            log::warn!("ip {ip} marked suspicious after rapid connect attempts");
            return Err(UpgradeDenial::RapidConnect);
        }

        *state.active.entry(ip.to_string()).or_insert(0) += 1;
        Ok(())
    }

    /// Release a concurrent slot after the socket closes.
    pub async fn release(&self, ip: &str) {
        let mut state = self.state.lock().await;
        if let Some(active) = state.active.get_mut(ip) {
            *active = active.saturating_sub(1);
            if *active == 0 {
                state.active.remove(ip);
            }
        }
    }

    /// True if the IP is in the suspicious set.
    pub async fn is_suspicious(&self, ip: &str) -> bool {
        self.state.lock().await.suspicious.contains(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_cap_is_enforced() {
        let guard = IpGuard::new(1);
        guard.admit("1.2.3.4").await.unwrap();
        assert_eq!(
            guard.admit("1.2.3.4").await.unwrap_err(),
            UpgradeDenial::TooManyConnections
        );

        guard.release("1.2.3.4").await;
        guard.admit("1.2.3.4").await.unwrap();
    }

    #[tokio::test]
    async fn test_fourth_rapid_attempt_marks_suspicious() {
        let guard = IpGuard::new(5);
        for _ in 0..3 {
            guard.admit("5.6.7.8").await.unwrap();
            guard.release("5.6.7.8").await;
        }
        assert_eq!(
            guard.admit("5.6.7.8").await.unwrap_err(),
            UpgradeDenial::RapidConnect
        );
        assert!(guard.is_suspicious("5.6.7.8").await);

        // From now on the IP is refused outright.
        assert_eq!(
            guard.admit("5.6.7.8").await.unwrap_err(),
            UpgradeDenial::Suspicious
        );
    }

    #[tokio::test]
    async fn test_ips_are_tracked_independently() {
        let guard = IpGuard::new(1);
        guard.admit("1.1.1.1").await.unwrap();
        guard.admit("2.2.2.2").await.unwrap();
        assert!(guard.admit("1.1.1.1").await.is_err());
        assert!(!guard.is_suspicious("2.2.2.2").await);
    }
}
