//! Timestamp utilities
//!
//! All schedule arithmetic uses signed milliseconds since the Unix epoch so
//! that values round-trip through SQLite INTEGER columns unchanged.

use chrono::Utc;

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}
