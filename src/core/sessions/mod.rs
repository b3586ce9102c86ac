//! Project sessions and invite codes.

pub mod api;
pub mod registry;

pub use api::sessions_router;
pub use registry::{INVITE_CODE_LEN, Invite, SessionRegistry, UserAssociations};
