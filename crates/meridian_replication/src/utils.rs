//! # Utility Functions
//!
//! Timestamp helpers shared by the store, the codec and the dispatch layer.
//! All wall-clock values in the replication protocol are microseconds since
//! the Unix epoch so that `last_edited` stamps from different peers compare
//! directly once clock skew has been applied.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in microseconds.
///
/// A clock set before the epoch yields `0` rather than panicking; such a
/// stamp simply loses every timestamp comparison.
pub fn usec_timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as u64)
        .unwrap_or(0)
}

/// Shifts a microsecond timestamp by a signed offset, saturating at the
/// bounds of `u64`.
pub fn apply_clock_skew(timestamp: u64, skew_usec: i64) -> u64 {
    if skew_usec >= 0 {
        timestamp.saturating_add(skew_usec as u64)
    } else {
        timestamp.saturating_sub(skew_usec.unsigned_abs())
    }
}
