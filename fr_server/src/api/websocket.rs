//! WebSocket upgrade endpoint and socket pump.
//!
//! Upgrade policy, in order: IP guard (suspicious set, per-IP concurrent
//! cap, rapid-connect window), origin allow-list, then the `session_token`
//! cookie. All of it runs before the upgrade completes, so an
//! unauthenticated client never holds a socket.
//!
//! Once upgraded, two tasks run per connection: the writer drains the
//! connection's outbound queue into the socket (decrementing the
//! backpressure counter), and the read loop feeds frames to the session
//! router.

use axum::{
    extract::{
        ConnectInfo, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;

use flag_rush::conn::{ClientConnection, OutboundFrame};
use flag_rush::user::UserId;

use super::AppState;
use super::ip_guard::UpgradeDenial;
use crate::metrics;

/// Name of the session cookie checked at upgrade time.
pub const SESSION_COOKIE: &str = "session_token";

/// `GET /ws` — upgrade to a WebSocket session.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let ip = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));

    if let Err(denial) = state.ip_guard.admit(&ip).await {
        return match denial {
            UpgradeDenial::Suspicious => {
                metrics::ws_upgrades_rejected("suspicious");
                (StatusCode::FORBIDDEN, "connection refused").into_response()
            }
            UpgradeDenial::TooManyConnections => {
                metrics::ws_upgrades_rejected("per_ip_cap");
                (StatusCode::TOO_MANY_REQUESTS, "connection limit reached").into_response()
            }
            UpgradeDenial::RapidConnect => {
                metrics::ws_upgrades_rejected("rapid_connect");
                (StatusCode::TOO_MANY_REQUESTS, "too many connection attempts").into_response()
            }
        };
    }

    // Origin, when present, must be on the allow-list.
    if let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok())
        && !state.config.allowed_origins.iter().any(|o| o == origin)
    {
        state.ip_guard.release(&ip).await;
        metrics::ws_upgrades_rejected("origin");
        return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    // Pre-upgrade authentication: the signed session cookie names the user.
    let user_id = match session_cookie(&headers)
        .and_then(|token| state.tokens.verify(&token).ok())
    {
        Some(user_id) => user_id,
        None => {
            state.ip_guard.release(&ip).await;
            metrics::ws_upgrades_rejected("unauthenticated");
            return (StatusCode::UNAUTHORIZED, "missing or invalid session").into_response();
        }
    };

    tracing::debug!(user_id = %user_id, ip = %ip, "websocket upgrade accepted");
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, ip, state))
}

/// Drive one established connection until it closes.
async fn handle_socket(socket: WebSocket, user_id: UserId, ip: String, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (conn, mut outbound_rx) = ClientConnection::new(user_id.clone(), ip.clone());
    metrics::ws_connections_total();

    // Writer: connection queue -> socket. Ends on a close frame or a dead
    // peer; the buffered-bytes counter tracks what is still queued.
    let writer_conn = conn.clone();
    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let len = frame.len();
            match frame {
                OutboundFrame::Text(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                OutboundFrame::Close { code, reason } => {
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
            writer_conn.frame_written(len);
        }
    });

    state.session.on_open(conn.clone()).await;

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                metrics::ws_messages_received();
                state.session.on_message(&conn, text.as_str()).await;
                if !conn.is_open() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!(user_id = %user_id, "websocket read error: {e}");
                break;
            }
            _ => {}
        }
    }

    state.session.on_close(&conn).await;
    send_task.abort();
    state.ip_guard.release(&ip).await;
    tracing::debug!(user_id = %user_id, "websocket session finished");
}

/// Source IP, honoring `x-forwarded-for` from a fronting proxy.
fn client_ip(headers: &HeaderMap, addr: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| {
            addr.map(|a| a.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        })
}

/// Extract the session token from the Cookie header.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "other=1; session_token=abc.def.ghi; theme=dark".parse().unwrap(),
        );
        assert_eq!(session_cookie(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_session_cookie_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "other=1".parse().unwrap());
        assert!(session_cookie(&headers).is_none());
        assert!(session_cookie(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let addr: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, Some(addr)), "203.0.113.7");
        assert_eq!(client_ip(&HeaderMap::new(), Some(addr)), "10.0.0.1");
        assert_eq!(client_ip(&HeaderMap::new(), None), "unknown");
    }
}
