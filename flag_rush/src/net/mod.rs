//! Wire protocol shared by the WebSocket surface.

pub mod messages;
