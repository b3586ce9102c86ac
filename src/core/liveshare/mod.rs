//! Live collaboration rooms
//!
//! Provides WebSocket-based presence with:
//! - One room per project, created on first join
//! - Join/leave announcements and a roster for newcomers
//! - Relaying of code changes and cursor moves to the rest of the room
//! - Bounded per-connection queues with drop-or-evict back-pressure

mod hub;
mod protocol;
mod room;
mod websocket;

pub use hub::*;
pub use protocol::*;
pub use room::{ConnId, ConnectionHandle, Room};
pub use websocket::*;
