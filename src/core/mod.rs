//! Collaboration core: sessions, presence, files and meetings

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod files;
pub mod liveshare;
pub mod meetings;
pub mod models;
pub mod policy;
pub mod sessions;
pub mod state;

pub use error::{ApiError, CollabError, CollabResult};
pub use state::{AppState, app_router};
