//! Protocol and gameplay constants.

/// Points awarded for a correct answer. Flat, no speed bonus.
pub const CORRECT_POINT_COST: u32 = 1;

/// Ceiling for a single inbound WebSocket payload.
pub const MAX_INBOUND_FRAME_BYTES: usize = 128 * 1024;

/// Outbound buffer ceiling per connection; beyond this the peer is closed
/// with [`CLOSE_BACKPRESSURE`].
pub const MAX_OUTBOUND_BUFFER_BYTES: usize = 1024 * 1024;

/// Close code for a session superseded by a new login.
pub const CLOSE_SUPERSEDED: u16 = 4000;

/// Close code for an unauthenticated connection.
pub const CLOSE_UNAUTHORIZED: u16 = 4001;

/// Close code for an oversized inbound message.
pub const CLOSE_MESSAGE_TOO_LARGE: u16 = 1009;

/// Close code for a connection whose outbound buffer exceeded the ceiling.
pub const CLOSE_BACKPRESSURE: u16 = 1013;

/// Normal close, used when the server disconnects a kicked user.
pub const CLOSE_NORMAL: u16 = 1000;

/// Invite codes are this many uppercase alphanumerics.
pub const INVITE_CODE_LEN: usize = 6;

/// Attempts at generating a collision-free invite code before giving up.
pub const INVITE_CODE_MAX_RETRIES: usize = 16;

/// Room member limits.
pub const MIN_ROOM_SIZE: usize = 2;
pub const MAX_ROOM_SIZE: usize = 5;

/// Username length bounds after sanitization.
pub const MIN_USERNAME_LEN: usize = 2;
pub const MAX_USERNAME_LEN: usize = 30;

/// Answer length ceiling after sanitization.
pub const MAX_ANSWER_LEN: usize = 100;

/// Substrings a username may not contain.
pub const RESERVED_USERNAMES: [&str; 6] =
    ["admin", "moderator", "bot", "system", "null", "undefined"];

/// Allowed per-question time budgets, seconds.
pub const ALLOWED_QUESTION_TIMES: [u32; 4] = [10, 15, 20, 30];

/// Hard lifetime for a room, after which it is purged.
pub const MAX_ROOM_LIFETIME_SECS: i64 = 4 * 60 * 60;

/// Rooms inside this window of their TTL receive a warning broadcast.
pub const ROOM_TTL_WARNING_SECS: i64 = 5 * 60;
