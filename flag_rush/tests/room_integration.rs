//! Room membership scenarios: join/leave/kick, host succession, capacity,
//! and settings policy.

use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;

use flag_rush::broadcast::Broadcaster;
use flag_rush::conn::{ClientConnection, ConnectionRegistry, OutboundFrame};
use flag_rush::game::engine::{GameEngine, GameTimings};
use flag_rush::heartbeat::{HeartbeatConfig, HeartbeatMonitor};
use flag_rush::questions::FlagQuestionProvider;
use flag_rush::room::RoomStore;
use flag_rush::security::RateLimiter;
use flag_rush::session::SessionRouter;
use flag_rush::user::UserStore;

struct TestServer {
    users: Arc<UserStore>,
    rooms: Arc<RoomStore>,
    router: Arc<SessionRouter>,
}

fn test_server() -> TestServer {
    let users = Arc::new(UserStore::new());
    let rooms = Arc::new(RoomStore::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let (broadcaster, evict_rx) = Broadcaster::new(registry.clone(), rooms.clone());
    let engine = GameEngine::new(
        rooms.clone(),
        broadcaster.clone(),
        Arc::new(FlagQuestionProvider::new()),
        GameTimings {
            start_countdown: Duration::from_millis(20),
            results_delay: Duration::from_millis(20),
        },
    );
    let heartbeats = HeartbeatMonitor::new(
        registry.clone(),
        broadcaster.clone(),
        HeartbeatConfig::default(),
    );
    let limiter = Arc::new(RateLimiter::new());
    let router = SessionRouter::new(
        users.clone(),
        rooms.clone(),
        registry,
        broadcaster,
        engine,
        heartbeats,
        limiter,
    );
    router.spawn_harvester(evict_rx);
    TestServer {
        users,
        rooms,
        router,
    }
}

type Frames = mpsc::UnboundedReceiver<OutboundFrame>;

async fn connect(server: &TestServer, user_id: &str) -> (Arc<ClientConnection>, Frames) {
    let (conn, mut rx) = ClientConnection::new(user_id.to_string(), "127.0.0.1".to_string());
    server.router.on_open(conn.clone()).await;
    recv_type(&mut rx, "AUTH_SUCCESS").await;
    (conn, rx)
}

async fn send(server: &TestServer, conn: &Arc<ClientConnection>, frame: Value) {
    server.router.on_message(conn, &frame.to_string()).await;
}

async fn recv_next(rx: &mut Frames) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("connection channel closed");
    match frame {
        OutboundFrame::Text(text) => serde_json::from_str(&text).unwrap(),
        OutboundFrame::Close { code, .. } => panic!("unexpected close frame (code {code})"),
    }
}

async fn recv_type(rx: &mut Frames, kind: &str) -> Value {
    loop {
        let value = recv_next(rx).await;
        if value["type"] == kind {
            return value;
        }
    }
}

/// Create a two-seat room hosted by alice and return its id and invite code.
async fn small_room(server: &TestServer, conn: &Arc<ClientConnection>, rx: &mut Frames) -> (String, String) {
    send(
        server,
        conn,
        json!({"type": "CREATE_ROOM", "data": {"username": "alice", "settings": {"maxRoomSize": 2}}}),
    )
    .await;
    let created = recv_type(rx, "CREATE_ROOM_SUCCESS").await;
    (
        created["data"]["room"]["id"].as_str().unwrap().to_string(),
        created["data"]["room"]["inviteCode"]
            .as_str()
            .unwrap()
            .to_string(),
    )
}

async fn join(server: &TestServer, conn: &Arc<ClientConnection>, invite: &str, name: &str) {
    send(
        server,
        conn,
        json!({"type": "JOIN_ROOM", "data": {"inviteCode": invite, "username": name}}),
    )
    .await;
}

#[tokio::test]
async fn test_room_full_rejection() {
    let server = test_server();
    let (conn_a, mut rx_a) = connect(&server, "user-a").await;
    let (room_id, invite) = small_room(&server, &conn_a, &mut rx_a).await;

    let (conn_b, mut rx_b) = connect(&server, "user-b").await;
    join(&server, &conn_b, &invite, "bob").await;
    recv_type(&mut rx_b, "JOIN_ROOM_SUCCESS").await;

    let (conn_c, mut rx_c) = connect(&server, "user-c").await;
    join(&server, &conn_c, &invite, "carol").await;
    let err = recv_type(&mut rx_c, "ERROR").await;
    assert_eq!(err["data"]["code"], "ROOM_FULL");

    // Membership unchanged.
    let handle = server.rooms.get(&room_id).await.unwrap();
    let room = handle.lock().await;
    assert_eq!(room.members.len(), 2);
    assert!(!room.has_member("user-c"));
}

#[tokio::test]
async fn test_kicked_cannot_rejoin() {
    let server = test_server();
    let (conn_a, mut rx_a) = connect(&server, "user-a").await;
    let (_room_id, invite) = small_room(&server, &conn_a, &mut rx_a).await;

    let (conn_b, mut rx_b) = connect(&server, "user-b").await;
    join(&server, &conn_b, &invite, "bob").await;
    recv_type(&mut rx_b, "JOIN_ROOM_SUCCESS").await;
    recv_type(&mut rx_a, "USER_JOINED").await;

    send(
        &server,
        &conn_a,
        json!({"type": "KICK_USER", "data": {"userId": "user-b"}}),
    )
    .await;

    // Target gets the direct KICKED frame, host sees the broadcast.
    recv_type(&mut rx_b, "KICKED").await;
    let kicked = recv_type(&mut rx_a, "USER_KICKED").await;
    assert_eq!(kicked["data"]["userId"], "user-b");
    assert_eq!(kicked["data"]["username"], "bob");

    // B reconnects and tries the same invite code.
    let (conn_b2, mut rx_b2) = connect(&server, "user-b").await;
    join(&server, &conn_b2, &invite, "bobby").await;
    let err = recv_type(&mut rx_b2, "ERROR").await;
    assert_eq!(err["data"]["code"], "KICKED_FROM_ROOM");
}

#[tokio::test]
async fn test_duplicate_username_rejected() {
    let server = test_server();
    let (conn_a, mut rx_a) = connect(&server, "user-a").await;
    let (_room_id, invite) = small_room(&server, &conn_a, &mut rx_a).await;

    let (conn_b, mut rx_b) = connect(&server, "user-b").await;
    join(&server, &conn_b, &invite, "alice").await;
    let err = recv_type(&mut rx_b, "ERROR").await;
    assert_eq!(err["data"]["code"], "USERNAME_TAKEN");
}

#[tokio::test]
async fn test_join_unknown_invite_code() {
    let server = test_server();
    let (conn_a, mut rx_a) = connect(&server, "user-a").await;
    join(&server, &conn_a, "ZZZ999", "alice").await;
    let err = recv_type(&mut rx_a, "ERROR").await;
    assert_eq!(err["data"]["code"], "ROOM_NOT_FOUND");
}

#[tokio::test]
async fn test_cannot_join_two_rooms() {
    let server = test_server();
    let (conn_a, mut rx_a) = connect(&server, "user-a").await;
    small_room(&server, &conn_a, &mut rx_a).await;

    let (conn_b, mut rx_b) = connect(&server, "user-b").await;
    send(
        &server,
        &conn_b,
        json!({"type": "CREATE_ROOM", "data": {"username": "bob"}}),
    )
    .await;
    let created = recv_type(&mut rx_b, "CREATE_ROOM_SUCCESS").await;
    let other_invite = created["data"]["room"]["inviteCode"].as_str().unwrap();

    // Alice is already in her own room.
    join(&server, &conn_a, other_invite, "alice2").await;
    let err = recv_type(&mut rx_a, "ERROR").await;
    assert_eq!(err["data"]["code"], "USER_ALREADY_IN_ROOM");
}

#[tokio::test]
async fn test_leave_promotes_next_host_and_empty_room_dies() {
    let server = test_server();
    let (conn_a, mut rx_a) = connect(&server, "user-a").await;
    let (room_id, invite) = small_room(&server, &conn_a, &mut rx_a).await;

    let (conn_b, mut rx_b) = connect(&server, "user-b").await;
    join(&server, &conn_b, &invite, "bob").await;
    recv_type(&mut rx_b, "JOIN_ROOM_SUCCESS").await;

    // Host leaves: bob is promoted and notified in order.
    send(&server, &conn_a, json!({"type": "LEAVE_ROOM"})).await;
    let host_changed = recv_type(&mut rx_b, "HOST_CHANGED").await;
    assert_eq!(host_changed["data"]["newHost"], "user-b");
    let user_left = recv_next(&mut rx_b).await;
    assert_eq!(user_left["type"], "USER_LEFT");

    let alice = server.users.get("user-a").await.unwrap();
    assert!(alice.room_id.is_none());
    assert!(!alice.is_admin);
    let bob = server.users.get("user-b").await.unwrap();
    assert!(bob.is_admin);

    // Last member leaves: the room is deleted outright.
    send(&server, &conn_b, json!({"type": "LEAVE_ROOM"})).await;
    assert!(server.rooms.get(&room_id).await.is_none());
    assert!(server.rooms.find_by_invite(&invite).await.is_none());
}

#[tokio::test]
async fn test_settings_update_policy() {
    let server = test_server();
    let (conn_a, mut rx_a) = connect(&server, "user-a").await;
    send(
        &server,
        &conn_a,
        json!({"type": "CREATE_ROOM", "data": {"username": "alice"}}),
    )
    .await;
    recv_type(&mut rx_a, "CREATE_ROOM_SUCCESS").await;
    let created_invite = {
        let rooms = server.rooms.all().await;
        rooms[0].lock().await.invite_code.clone()
    };

    let (conn_b, mut rx_b) = connect(&server, "user-b").await;
    join(&server, &conn_b, &created_invite, "bob").await;
    recv_type(&mut rx_b, "JOIN_ROOM_SUCCESS").await;

    // Guests may not change settings.
    send(
        &server,
        &conn_b,
        json!({"type": "UPDATE_ROOM_SETTINGS", "data": {"difficulty": "hard"}}),
    )
    .await;
    let err = recv_type(&mut rx_b, "ERROR").await;
    assert_eq!(err["data"]["code"], "PERMISSION_DENIED");

    // Host updates difficulty; question count is rederived and broadcast.
    send(
        &server,
        &conn_a,
        json!({"type": "UPDATE_ROOM_SETTINGS", "data": {"difficulty": "expert", "timePerQuestion": 30}}),
    )
    .await;
    let updated = recv_type(&mut rx_b, "SETTINGS_UPDATED").await;
    assert_eq!(updated["data"]["settings"]["difficulty"], "expert");
    assert_eq!(updated["data"]["settings"]["questionCount"], 30);
    assert_eq!(updated["data"]["settings"]["timePerQuestion"], 30);

    // Shrinking to the current member count is allowed; below it is not.
    send(
        &server,
        &conn_a,
        json!({"type": "UPDATE_ROOM_SETTINGS", "data": {"maxRoomSize": 2}}),
    )
    .await;
    let ok = recv_type(&mut rx_a, "SETTINGS_UPDATED").await;
    assert_eq!(ok["data"]["settings"]["maxRoomSize"], 2);

    let (conn_c, mut rx_c) = connect(&server, "user-c").await;
    join(&server, &conn_c, &created_invite, "carol").await;
    let err = recv_type(&mut rx_c, "ERROR").await;
    assert_eq!(err["data"]["code"], "ROOM_FULL");

    // Settings are locked while a game runs.
    send(&server, &conn_a, json!({"type": "START_GAME"})).await;
    recv_type(&mut rx_a, "GAME_STARTING").await;
    send(
        &server,
        &conn_a,
        json!({"type": "UPDATE_ROOM_SETTINGS", "data": {"difficulty": "easy"}}),
    )
    .await;
    let err = recv_type(&mut rx_a, "ERROR").await;
    assert_eq!(err["data"]["code"], "INVALID_GAME_STATE");
}

#[tokio::test]
async fn test_independent_joins_commute() {
    // Two users joining two distinct rooms end in the same state regardless
    // of interleaving.
    for order in [0, 1] {
        let server = test_server();
        let (conn_a, mut rx_a) = connect(&server, "host-a").await;
        let (_ra, invite_a) = small_room(&server, &conn_a, &mut rx_a).await;
        let (conn_b, mut rx_b) = connect(&server, "host-b").await;
        send(
            &server,
            &conn_b,
            json!({"type": "CREATE_ROOM", "data": {"username": "beth", "settings": {"maxRoomSize": 2}}}),
        )
        .await;
        let created = recv_type(&mut rx_b, "CREATE_ROOM_SUCCESS").await;
        let invite_b = created["data"]["room"]["inviteCode"]
            .as_str()
            .unwrap()
            .to_string();

        let (conn_c, mut rx_c) = connect(&server, "user-c").await;
        let (conn_d, mut rx_d) = connect(&server, "user-d").await;

        if order == 0 {
            join(&server, &conn_c, &invite_a, "carol").await;
            join(&server, &conn_d, &invite_b, "dave").await;
        } else {
            join(&server, &conn_d, &invite_b, "dave").await;
            join(&server, &conn_c, &invite_a, "carol").await;
        }
        recv_type(&mut rx_c, "JOIN_ROOM_SUCCESS").await;
        recv_type(&mut rx_d, "JOIN_ROOM_SUCCESS").await;

        let room_a = server.rooms.find_by_invite(&invite_a).await.unwrap();
        let room_b = server.rooms.find_by_invite(&invite_b).await.unwrap();
        assert!(room_a.lock().await.has_member("user-c"));
        assert!(room_b.lock().await.has_member("user-d"));
        assert_eq!(room_a.lock().await.members.len(), 2);
        assert_eq!(room_b.lock().await.members.len(), 2);
    }
}

#[tokio::test]
async fn test_kick_requires_host_and_membership() {
    let server = test_server();
    let (conn_a, mut rx_a) = connect(&server, "user-a").await;
    let (_room_id, invite) = small_room(&server, &conn_a, &mut rx_a).await;

    let (conn_b, mut rx_b) = connect(&server, "user-b").await;
    join(&server, &conn_b, &invite, "bob").await;
    recv_type(&mut rx_b, "JOIN_ROOM_SUCCESS").await;

    // Guest cannot kick.
    send(
        &server,
        &conn_b,
        json!({"type": "KICK_USER", "data": {"userId": "user-a"}}),
    )
    .await;
    let err = recv_type(&mut rx_b, "ERROR").await;
    assert_eq!(err["data"]["code"], "PERMISSION_DENIED");

    // Host cannot kick a stranger or themselves.
    send(
        &server,
        &conn_a,
        json!({"type": "KICK_USER", "data": {"userId": "ghost"}}),
    )
    .await;
    let err = recv_type(&mut rx_a, "ERROR").await;
    assert_eq!(err["data"]["code"], "USER_NOT_FOUND");

    send(
        &server,
        &conn_a,
        json!({"type": "KICK_USER", "data": {"userId": "user-a"}}),
    )
    .await;
    let err = recv_type(&mut rx_a, "ERROR").await;
    assert_eq!(err["data"]["code"], "INVALID_INPUT");
}
