//! Admin dumps, gated by the `x-api-key` middleware.

use axum::{Json, extract::State};
use serde::Serialize;
use serde_json::json;

use flag_rush::room::RoomView;
use flag_rush::user::User;

use super::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminRoom {
    #[serde(flatten)]
    view: RoomView,
    kicked_users: Vec<String>,
    ttl_warned: bool,
    expires_at: i64,
}

/// Full dump of every live room.
pub async fn dump_rooms(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut rooms = Vec::new();
    for handle in state.rooms.all().await {
        let room = handle.lock().await;
        rooms.push(AdminRoom {
            view: room.view(),
            kicked_users: room.kicked_users.iter().cloned().collect(),
            ttl_warned: room.ttl_warned,
            expires_at: room.expires_at().timestamp_millis(),
        });
    }
    let count = rooms.len();
    Json(json!({ "data": rooms, "count": count }))
}

/// Full dump of every live user.
pub async fn dump_users(State(state): State<AppState>) -> Json<serde_json::Value> {
    let users: Vec<User> = state.users.all().await;
    let count = users.len();
    Json(json!({ "data": users, "count": count }))
}
