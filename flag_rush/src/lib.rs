//! # Flag Rush
//!
//! Realtime backend engine for a multiplayer flag-guessing game.
//!
//! Clients hold a persistent WebSocket session, create or join small rooms
//! (2–5 players), and the host drives synchronous rounds: every member sees
//! the same flag question, answers under a time budget, and receives scored
//! results before the next round. The server is the single source of truth
//! for game state, membership, scoring, and time.
//!
//! ## Architecture
//!
//! Everything transport-independent lives in this crate:
//!
//! - [`session`]: per-message router — authentication, rate check,
//!   validation, handler dispatch, disconnect flow
//! - [`game`]: the per-room round state machine and its timer registry
//! - [`room`] / [`user`]: in-memory stores with per-room locking
//! - [`conn`] / [`broadcast`]: live connection registry and room/user fan-out
//!   with backpressure and dead-connection harvesting
//! - [`heartbeat`]: server-initiated liveness probing
//! - [`cleanup`]: periodic sweeps for inactive users and expired rooms
//! - [`questions`]: flag question provider with difficulty pools
//! - [`validate`] / [`security`]: structural validation and sliding-window
//!   rate limiting
//!
//! The HTTP/WebSocket surface (axum upgrade endpoint, admin/stats endpoints)
//! is a thin adapter in the `fr_server` crate. Connections are modeled as
//! outbound frame queues, so the whole engine is testable without sockets.
//!
//! All state is in-memory; process death loses rooms by design.

pub mod auth;
pub mod broadcast;
pub mod cleanup;
pub mod clock;
pub mod conn;
pub mod constants;
pub mod errors;
pub mod game;
pub mod heartbeat;
pub mod net;
pub mod questions;
pub mod room;
pub mod security;
pub mod session;
pub mod user;
pub mod validate;

pub use errors::{AppError, AppResult, ErrorKind};
pub use game::engine::{GameEngine, GameTimings};
pub use room::{Room, RoomId, RoomSettings, RoomStore};
pub use session::SessionRouter;
pub use user::{User, UserId, UserStore};
