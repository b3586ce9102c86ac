//! Version-checked project file storage.

pub mod api;
pub mod store;

pub use api::files_router;
pub use store::{FileKey, FileSnapshot, FileStore, FileSummary};
