//! Codeshare - real-time collaborative code editing core
//!
//! Shared project rooms with live presence, cursor and edit relaying,
//! invite-gated sessions, scheduled meetings and a version-checked file store.

pub mod core;
