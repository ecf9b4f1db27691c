//! roster-watch — member snapshots, change detection, and notification text.

pub mod diff;
pub mod format;
pub mod storage;
pub mod types;

pub use diff::compute_changes;
pub use format::Formatter;
pub use storage::{BaselineStore, JsonBaselineStore};
pub use types::*;
