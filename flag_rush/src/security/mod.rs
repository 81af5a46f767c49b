//! Abuse controls for the realtime surface.

pub mod rate_limiter;

pub use rate_limiter::{RateLimiter, RateRule};
