//! Database models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A catalog track as the scheduler sees it
///
/// Rows are created by the ingestion service; the scheduler only reads them
/// and bumps `play_count`. `duration_ms` is always positive (enforced by a
/// CHECK constraint on the `tracks` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    pub duration_ms: i64,
    pub play_count: i64,
    /// Cumulative tip weight received by the track
    pub tip_weight: f64,
    /// Creation time, epoch milliseconds
    pub created_at_ms: i64,
}

impl Track {
    /// Epoch millisecond at which a play of this track starting at
    /// `started_at_ms` ends
    pub fn ends_at(&self, started_at_ms: i64) -> i64 {
        started_at_ms + self.duration_ms
    }
}
