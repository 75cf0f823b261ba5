pub mod challenge;
pub mod config;
pub mod garden;
pub mod history;
pub mod profile;
pub mod stats;
pub mod task;
pub mod timer;

/// The CLI is single-user; every record belongs to this id.
pub(crate) const DEFAULT_USER_ID: i64 = 1;
