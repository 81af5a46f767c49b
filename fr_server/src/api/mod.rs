//! HTTP/WebSocket surface.
//!
//! Thin adapters over the core stores and the session router:
//!
//! - `GET /api/status` — liveness probe, plain "OK"
//! - `GET /api/healthz` — health JSON
//! - `GET /api/stats` — room/user/game counts
//! - `GET /api/rooms/{inviteCode}` — public room lookup
//! - `GET /api/admin/rooms`, `GET /api/admin/users` — key-gated dumps
//! - `GET /ws` — the WebSocket upgrade (session cookie auth)
//!
//! Errors use the JSON envelope `{error: {code, message, timestamp,
//! requestId?, details?}}` with the matching status code.

pub mod admin;
pub mod ip_guard;
pub mod middleware;
pub mod request_id;
pub mod websocket;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use flag_rush::auth::SessionTokenManager;
use flag_rush::clock::now_ms;
use flag_rush::conn::ConnectionRegistry;
use flag_rush::errors::{AppError, ErrorKind};
use flag_rush::room::RoomStore;
use flag_rush::session::SessionRouter;
use flag_rush::user::UserStore;
use flag_rush::validate;

use crate::config::ServerConfig;
use crate::metrics;
use self::ip_guard::IpGuard;
use self::request_id::RequestId;

/// Application state shared across all HTTP handlers and WebSocket
/// connections. Cloned per request; fields are `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserStore>,
    pub rooms: Arc<RoomStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub session: Arc<SessionRouter>,
    pub tokens: Arc<SessionTokenManager>,
    pub ip_guard: Arc<IpGuard>,
    pub config: Arc<ServerConfig>,
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Endpoint Summary
///
/// ```text
/// GET /api/status                - Liveness probe (public)
/// GET /api/healthz               - Health JSON (public)
/// GET /api/stats                 - Room/user/game counts (public)
/// GET /api/session               - Issue/refresh the session cookie (public)
/// GET /api/rooms/{inviteCode}    - Public room lookup
/// GET /api/admin/rooms           - Full room dump (x-api-key)
/// GET /api/admin/users           - Full user dump (x-api-key)
/// GET /ws                        - WebSocket upgrade (session cookie)
/// ```
pub fn create_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/api/admin/rooms", get(admin::dump_rooms))
        .route("/api/admin/users", get(admin::dump_users))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::admin_key_middleware,
        ));

    Router::new()
        .route("/api/status", get(status))
        .route("/api/healthz", get(healthz))
        .route("/api/stats", get(stats))
        .route("/api/session", get(issue_session))
        .route("/api/rooms/{invite_code}", get(lookup_room))
        .route("/ws", get(websocket::websocket_handler))
        .merge(admin_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::cors_middleware,
        ))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}

/// Error envelope returned by HTTP handlers.
pub struct ApiError {
    pub status: StatusCode,
    pub error: AppError,
    pub request_id: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: AppError) -> Self {
        Self {
            status,
            error,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn not_found(error: AppError) -> Self {
        Self::new(StatusCode::NOT_FOUND, error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": {
                "code": self.error.kind.as_str(),
                "message": self.error.message,
                "timestamp": now_ms(),
            }
        });
        if let Some(request_id) = self.request_id {
            body["error"]["requestId"] = json!(request_id);
        }
        if let Some(retry_after) = self.error.retry_after {
            body["error"]["details"] = json!({ "retryAfter": retry_after });
        }
        (self.status, Json(body)).into_response()
    }
}

/// Plain liveness probe.
async fn status() -> &'static str {
    "OK"
}

#[derive(Serialize)]
struct Healthz {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<Healthz> {
    Json(Healthz {
        status: "ok",
        timestamp: now_ms(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Stats {
    rooms: usize,
    users: usize,
    active_games: usize,
    timestamp: i64,
}

async fn stats(State(state): State<AppState>) -> Json<Stats> {
    let rooms = state.rooms.count().await;
    let users = state.users.count().await;

    let mut active_games = 0;
    for handle in state.rooms.all().await {
        if handle.lock().await.game.is_active {
            active_games += 1;
        }
    }

    metrics::rooms_active(rooms);
    metrics::users_active(users);
    metrics::games_active(active_games);
    metrics::ws_connections_active(state.registry.count().await);

    Json(Stats {
        rooms,
        users,
        active_games,
        timestamp: now_ms(),
    })
}

/// Issue a session token cookie for a new client. Re-requesting with a
/// valid cookie keeps the existing identity.
async fn issue_session(
    State(state): State<AppState>,
    request_id: RequestId,
    headers: axum::http::HeaderMap,
) -> Result<Response, ApiError> {
    // An existing valid cookie keeps its user id.
    let existing = headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                (name == websocket::SESSION_COOKIE).then(|| value.to_string())
            })
        })
        .and_then(|token| state.tokens.verify(&token).ok().map(|uid| (uid, token)));

    let (user_id, token) = match existing {
        Some(pair) => pair,
        None => state.tokens.issue_for_new_user().map_err(|err| {
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, err)
                .with_request_id(request_id.as_str())
        })?,
    };

    let cookie = format!(
        "{}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age=2592000",
        websocket::SESSION_COOKIE
    );
    let mut response = Json(json!({ "data": { "userId": user_id } })).into_response();
    if let Ok(value) = axum::http::HeaderValue::from_str(&cookie) {
        response
            .headers_mut()
            .insert(axum::http::header::SET_COOKIE, value);
    }
    Ok(response)
}

/// Public room lookup by invite code.
async fn lookup_room(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(invite_code): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let code = validate::invite_code(&invite_code).map_err(|err| {
        ApiError::new(StatusCode::BAD_REQUEST, err)
            .with_request_id(request_id.as_str())
    })?;

    let handle = state.rooms.find_by_invite(&code).await.ok_or_else(|| {
        ApiError::not_found(AppError::new(ErrorKind::RoomNotFound, "room not found"))
            .with_request_id(request_id.as_str())
    })?;

    let summary = handle.lock().await.summary();
    Ok(Json(json!({ "data": summary })))
}
