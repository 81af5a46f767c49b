//! Sliding-window rate limiting for client actions.
//!
//! Admission is decided per `(action, identifier)` with a two-bucket sliding
//! window: the previous window's count is weighted by how much of it still
//! overlaps the sliding window, so bursts at a window boundary cannot double
//! the allowance. Rejections carry a `retryAfter` hint and never close the
//! connection.

use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::clock::now_ms;
use crate::errors::{AppError, AppResult};

/// Limit for one action.
#[derive(Clone, Copy, Debug)]
pub struct RateRule {
    pub limit: u32,
    pub window_ms: i64,
}

impl RateRule {
    pub const fn new(limit: u32, window_ms: i64) -> Self {
        Self { limit, window_ms }
    }
}

#[derive(Clone, Copy, Debug)]
struct WindowCounter {
    current: u32,
    previous: u32,
    window_start: i64,
    last_touched: i64,
}

/// Sliding-window counters keyed by `(action, identifier)`.
pub struct RateLimiter {
    rules: HashMap<&'static str, RateRule>,
    counters: Mutex<HashMap<(String, String), WindowCounter>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Limiter with the production rule table.
    pub fn new() -> Self {
        let mut rules = HashMap::new();
        rules.insert("CREATE_ROOM", RateRule::new(5, 60_000));
        rules.insert("JOIN_ROOM", RateRule::new(20, 60_000));
        rules.insert("START_GAME", RateRule::new(10, 60_000));
        rules.insert("SUBMIT_ANSWER", RateRule::new(50, 10_000));
        Self {
            rules,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Limiter with a custom rule table, for tests.
    pub fn with_rules(rules: HashMap<&'static str, RateRule>) -> Self {
        Self {
            rules,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Check and record one call. Actions without a rule are always admitted.
    ///
    /// # Arguments
    ///
    /// * `action` - Wire action name (e.g. `"CREATE_ROOM"`)
    /// * `identifier` - Scope of the limit, normally the user id
    ///
    /// # Errors
    ///
    /// `RATE_LIMIT_EXCEEDED` with a `retryAfter` hint in seconds.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use flag_rush::security::RateLimiter;
    /// # async fn example() {
    /// let limiter = RateLimiter::new();
    /// assert!(limiter.check("CREATE_ROOM", "user-1").await.is_ok());
    /// # }
    /// ```
    pub async fn check(&self, action: &str, identifier: &str) -> AppResult<()> {
        let Some(rule) = self.rules.get(action).copied() else {
            return Ok(());
        };
        self.check_with_rule(action, identifier, rule).await
    }

    async fn check_with_rule(
        &self,
        action: &str,
        identifier: &str,
        rule: RateRule,
    ) -> AppResult<()> {
        let now = now_ms();
        let mut counters = self.counters.lock().await;
        let counter = counters
            .entry((action.to_string(), identifier.to_string()))
            .or_insert(WindowCounter {
                current: 0,
                previous: 0,
                window_start: (now / rule.window_ms) * rule.window_ms,
                last_touched: now,
            });

        match admit(counter, rule, now) {
            Ok(()) => Ok(()),
            Err(retry_after_ms) => {
                let retry_after = (retry_after_ms as u64).div_ceil(1000).max(1);
                Err(AppError::rate_limited(retry_after))
            }
        }
    }

    /// Drop counters untouched for three windows of their rule.
    pub async fn prune(&self) -> usize {
        let now = now_ms();
        let mut counters = self.counters.lock().await;
        let before = counters.len();
        counters.retain(|(action, _), counter| {
            let Some(rule) = self.rules.get(action.as_str()) else {
                return false;
            };
            now - counter.last_touched < 3 * rule.window_ms
        });
        before - counters.len()
    }

    /// Number of tracked counters, for the cleanup log line.
    pub async fn tracked(&self) -> usize {
        self.counters.lock().await.len()
    }
}

/// The window math. On rejection returns milliseconds until the current
/// window rolls over.
///
/// The previous window's count is weighted by the fraction of it still
/// inside the sliding window: `current + max(0, 1 - (now - start)/W) *
/// previous`. Admission increments the current bucket. Rolling forward by
/// exactly one window carries the current count into `previous`; a larger
/// gap clears both.
fn admit(counter: &mut WindowCounter, rule: RateRule, now: i64) -> Result<(), i64> {
    if now >= counter.window_start + rule.window_ms {
        let elapsed = now - counter.window_start;
        counter.previous = if elapsed < 2 * rule.window_ms {
            counter.current
        } else {
            0
        };
        counter.current = 0;
        counter.window_start = (now / rule.window_ms) * rule.window_ms;
    }

    let overlap = 1.0 - (now - counter.window_start) as f64 / rule.window_ms as f64;
    let weighted = f64::from(counter.current) + overlap.max(0.0) * f64::from(counter.previous);

    counter.last_touched = now;
    if weighted < f64::from(rule.limit) {
        counter.current += 1;
        Ok(())
    } else {
        Err(counter.window_start + rule.window_ms - now)
    }
}
