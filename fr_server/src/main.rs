//! Realtime flag-guessing game server.
//!
//! Wires the in-memory stores, the game engine, and the session router to
//! an axum HTTP/WebSocket surface, then serves until SIGINT/SIGTERM. All
//! state dies with the process by design.

use fr_server::{api, logging, metrics};

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Error;
use pico_args::Arguments;

use flag_rush::auth::SessionTokenManager;
use flag_rush::broadcast::Broadcaster;
use flag_rush::cleanup::CleanupService;
use flag_rush::conn::ConnectionRegistry;
use flag_rush::game::engine::{GameEngine, GameTimings};
use flag_rush::heartbeat::HeartbeatMonitor;
use flag_rush::questions::FlagQuestionProvider;
use flag_rush::room::RoomStore;
use flag_rush::security::RateLimiter;
use flag_rush::session::SessionRouter;
use flag_rush::user::UserStore;

use fr_server::api::ip_guard::IpGuard;
use fr_server::config::ServerConfig;

const HELP: &str = "\
Run the flag-guessing game server

USAGE:
  fr_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  SESSION_SECRET           Session token signing secret (required)
  ADMIN_API_KEY            Shared secret for /api/admin endpoints (required)
  ALLOWED_ORIGINS          Comma-separated CORS origin allow-list
  MAX_CONNECTIONS_PER_IP   Concurrent sockets per IP, 1-5 (default 1)
  METRICS_BIND             Prometheus exporter address (optional)
  (See config.rs for the full list)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // dotenvy does not override variables already in the environment.
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }
    let bind_override: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;

    logging::init();

    tracing::info!("loading configuration from environment...");
    let config = ServerConfig::from_env(bind_override)
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("configuration validation failed: {e}"))?;
    let config = Arc::new(config);

    if let Some(metrics_addr) = config.metrics_bind {
        match metrics::init_metrics(metrics_addr) {
            Ok(()) => tracing::info!("metrics endpoint at http://{metrics_addr}/metrics"),
            Err(e) => tracing::warn!("metrics disabled: {e}"),
        }
    }

    // Core state: stores, fan-out, engine, router.
    let users = Arc::new(UserStore::new());
    let rooms = Arc::new(RoomStore::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let (broadcaster, evict_rx) = Broadcaster::new(registry.clone(), rooms.clone());
    let engine = GameEngine::new(
        rooms.clone(),
        broadcaster.clone(),
        Arc::new(FlagQuestionProvider::new()),
        GameTimings::default(),
    );
    let heartbeats = HeartbeatMonitor::new(registry.clone(), broadcaster.clone(), config.heartbeat);
    let limiter = Arc::new(RateLimiter::new());
    let session = SessionRouter::new(
        users.clone(),
        rooms.clone(),
        registry.clone(),
        broadcaster.clone(),
        engine.clone(),
        heartbeats,
        limiter.clone(),
    );

    let harvester = session.spawn_harvester(evict_rx);

    let cleanup = CleanupService::new(
        users.clone(),
        rooms.clone(),
        broadcaster,
        engine,
        session.clone(),
        limiter,
        config.cleanup,
    );
    let cleanup_task = cleanup.spawn();
    tracing::info!(
        "cleanup sweep every {:?} (inactive users {}s, empty rooms {}s)",
        config.cleanup.interval,
        config.cleanup.inactive_user_timeout.num_seconds(),
        config.cleanup.empty_room_timeout.num_seconds(),
    );

    let state = api::AppState {
        users,
        rooms,
        registry,
        session,
        tokens: Arc::new(SessionTokenManager::new(config.session_secret.clone())),
        ip_guard: Arc::new(IpGuard::new(config.max_connections_per_ip)),
        config: config.clone(),
    };
    let app = api::create_router(state);

    tracing::info!("starting HTTP/WebSocket server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind to {}: {e}", config.bind))?;

    tracing::info!("server running at http://{}. Press Ctrl+C to stop.", config.bind);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| anyhow::anyhow!("server error: {e}"))?;

    tracing::info!("shutting down...");
    cleanup_task.abort();
    harvester.abort();

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
