//! Time-boxed project meetings.

pub mod api;
pub mod gate;

pub use api::meetings_router;
pub use gate::{MeetingGate, ScheduledMeeting};
