//! Schedule anchor types
//!
//! The anchor is the one committed record every reader resolves against:
//! which track is active, when it started, and the next few tracks already
//! chosen. `updated_at_ms` doubles as the optimistic concurrency token.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Committed play sequence for one broadcast channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleAnchor {
    pub channel: String,
    pub active_track_id: Uuid,
    /// Authoritative start of the active track, epoch milliseconds
    pub started_at_ms: i64,
    /// Upcoming track ids, next first
    pub committed_queue: Vec<Uuid>,
    /// Concurrency token; strictly increases on every write
    pub updated_at_ms: i64,
}

impl ScheduleAnchor {
    /// Next committed track id, without consuming it
    pub fn peek_next(&self) -> Option<Uuid> {
        self.committed_queue.first().copied()
    }

    /// Active track followed by the committed queue
    pub fn sequence(&self) -> impl Iterator<Item = Uuid> + '_ {
        std::iter::once(self.active_track_id).chain(self.committed_queue.iter().copied())
    }
}

/// New anchor contents proposed by a writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorUpdate {
    pub active_track_id: Uuid,
    pub started_at_ms: i64,
    pub committed_queue: Vec<Uuid>,
}

impl AnchorUpdate {
    /// True when no track appears twice in a row, active track included
    pub fn has_no_adjacent_repeats(&self) -> bool {
        let mut prev = self.active_track_id;
        for id in &self.committed_queue {
            if *id == prev {
                return false;
            }
            prev = *id;
        }
        true
    }
}

/// Result of a conditional anchor write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Write applied; carries the new concurrency token
    Committed { updated_at_ms: i64 },
    /// Another writer got there first; re-read before trying again
    Conflict,
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }
}

/// Token for a write replacing `expected_updated_at_ms` at wall time `now_ms`
///
/// Follows the wall clock but always moves forward, even when two writes
/// land within the same millisecond or the clock steps back.
pub fn next_token(expected_updated_at_ms: i64, now_ms: i64) -> i64 {
    now_ms.max(expected_updated_at_ms + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_token_strictly_increases() {
        assert_eq!(next_token(1_000, 5_000), 5_000);
        assert_eq!(next_token(5_000, 5_000), 5_001);
        assert_eq!(next_token(5_000, 4_000), 5_001);
    }

    #[test]
    fn test_adjacent_repeat_detection() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let ok = AnchorUpdate {
            active_track_id: a,
            started_at_ms: 0,
            committed_queue: vec![b, a, b],
        };
        assert!(ok.has_no_adjacent_repeats());

        let repeats_active = AnchorUpdate {
            active_track_id: a,
            started_at_ms: 0,
            committed_queue: vec![a, b],
        };
        assert!(!repeats_active.has_no_adjacent_repeats());

        let repeats_in_queue = AnchorUpdate {
            active_track_id: a,
            started_at_ms: 0,
            committed_queue: vec![b, b],
        };
        assert!(!repeats_in_queue.has_no_adjacent_repeats());
    }

    #[test]
    fn test_peek_and_sequence() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let anchor = ScheduleAnchor {
            channel: "main".into(),
            active_track_id: a,
            started_at_ms: 0,
            committed_queue: vec![b],
            updated_at_ms: 1,
        };
        assert_eq!(anchor.peek_next(), Some(b));
        assert_eq!(anchor.sequence().collect::<Vec<_>>(), vec![a, b]);
        // Peeking does not consume
        assert_eq!(anchor.committed_queue.len(), 1);
    }
}
