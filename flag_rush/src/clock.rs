//! Wall-clock helpers.
//!
//! All wire-visible timestamps are Unix milliseconds. Timers use the tokio
//! runtime clock; this module only covers the wall clock stamped into frames
//! and stored on records.

use chrono::{DateTime, Utc};

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current wall-clock time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
