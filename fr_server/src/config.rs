//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated
//! configuration. Only the session secret and the admin key are required;
//! everything else has production defaults.

use chrono::Duration as ChronoDuration;
use std::net::SocketAddr;
use std::time::Duration;

use flag_rush::cleanup::CleanupConfig;
use flag_rush::heartbeat::HeartbeatConfig;

/// Complete server configuration loaded from environment variables.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Server bind address.
    pub bind: SocketAddr,
    /// Secret signing the `session_token` cookie (required).
    pub session_secret: String,
    /// Shared secret for the `/api/admin` endpoints (required).
    pub admin_api_key: String,
    /// Origins allowed by the CORS policy and the upgrade check.
    pub allowed_origins: Vec<String>,
    /// Concurrent WebSocket connections allowed per IP.
    pub max_connections_per_ip: usize,
    /// Heartbeat pacing.
    pub heartbeat: HeartbeatConfig,
    /// Cleanup sweep pacing and timeouts.
    pub cleanup: CleanupConfig,
    /// Prometheus exporter bind address; `None` disables metrics.
    pub metrics_bind: Option<SocketAddr>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is
    /// outside its allowed range.
    pub fn from_env(bind_override: Option<SocketAddr>) -> Result<Self, ConfigError> {
        let bind = bind_override
            .or_else(|| {
                std::env::var("SERVER_BIND")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or_else(|| {
                "127.0.0.1:8080"
                    .parse()
                    .expect("default bind address is valid")
            });

        let session_secret =
            std::env::var("SESSION_SECRET").map_err(|_| ConfigError::MissingRequired {
                var: "SESSION_SECRET".to_string(),
                hint: "Generate with: openssl rand -hex 32".to_string(),
            })?;

        let admin_api_key =
            std::env::var("ADMIN_API_KEY").map_err(|_| ConfigError::MissingRequired {
                var: "ADMIN_API_KEY".to_string(),
                hint: "Generate with: openssl rand -hex 16".to_string(),
            })?;

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:3001".to_string(),
                    "https://flags.games".to_string(),
                    "https://www.flags.games".to_string(),
                ]
            });

        let heartbeat = HeartbeatConfig {
            interval: Duration::from_secs(parse_env_or("HEARTBEAT_INTERVAL_SECS", 30)),
            timeout: Duration::from_secs(parse_env_or("HEARTBEAT_TIMEOUT_SECS", 10)),
            max_missed: parse_env_or("HEARTBEAT_MAX_MISSED", 3),
        };

        let cleanup = CleanupConfig {
            interval: Duration::from_secs(parse_env_or("CLEANUP_INTERVAL_SECS", 300)),
            inactive_user_timeout: ChronoDuration::seconds(parse_env_or(
                "INACTIVE_USER_TIMEOUT_SECS",
                300,
            )),
            empty_room_timeout: ChronoDuration::seconds(parse_env_or(
                "EMPTY_ROOM_TIMEOUT_SECS",
                600,
            )),
        };

        let metrics_bind = std::env::var("METRICS_BIND")
            .ok()
            .and_then(|s| s.parse().ok());

        Ok(ServerConfig {
            bind,
            session_secret,
            admin_api_key,
            allowed_origins,
            max_connections_per_ip: parse_env_or("MAX_CONNECTIONS_PER_IP", 1),
            heartbeat,
            cleanup,
            metrics_bind,
        })
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "SESSION_SECRET".to_string(),
                reason: "must be at least 32 characters".to_string(),
            });
        }
        if self.admin_api_key.len() < 16 {
            return Err(ConfigError::Invalid {
                var: "ADMIN_API_KEY".to_string(),
                reason: "must be at least 16 characters".to_string(),
            });
        }
        if !(1..=5).contains(&self.max_connections_per_ip) {
            return Err(ConfigError::Invalid {
                var: "MAX_CONNECTIONS_PER_IP".to_string(),
                reason: "must be between 1 and 5".to_string(),
            });
        }
        if self.heartbeat.max_missed == 0 {
            return Err(ConfigError::Invalid {
                var: "HEARTBEAT_MAX_MISSED".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Parse an environment variable with a default fallback.
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
