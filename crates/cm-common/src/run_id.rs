//! Run identifiers for ranking executions.
//!
//! Each ranking run gets a fresh ULID which doubles as the workflow status
//! row id, so every persisted record of a run can be traced back to the
//! execution that produced it. The process-level id ties worker log lines
//! from one process lifetime together.

use once_cell::sync::Lazy;
use ulid::Ulid;

/// Process-level id, generated once at first access.
static PROCESS_ID: Lazy<String> = Lazy::new(|| Ulid::new().to_string());

/// Returns the process-level id (same value for the entire process lifetime).
#[inline]
pub fn process() -> &'static str {
    &PROCESS_ID
}

/// Generates a fresh ULID for one ranking run.
///
/// ULIDs are 26 characters, URL-safe, and sort lexicographically by creation
/// time, so workflow rows order naturally by run start.
#[inline]
pub fn generate() -> String {
    Ulid::new().to_string()
}
