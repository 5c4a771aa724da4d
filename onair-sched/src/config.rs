//! Scheduler configuration
//!
//! Values live in the `settings` table (see `db::settings`) so every
//! instance sharing a database schedules with the same policy.

use crate::schedule::selection::{SelectionPolicy, SelectionWeights};

/// Broadcast channel used when none is configured
pub const DEFAULT_CHANNEL: &str = "main";

/// Tunable scheduling policy
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Target length of the committed queue
    pub lookahead_length: usize,
    /// Trailing span of a track during which the next track is revealed
    pub crossfade_lead_ms: i64,
    /// Number of most recent plays a new pick must avoid
    pub anti_repeat_window: usize,
    /// Selection weighting knobs
    pub weights: SelectionWeights,
    /// Period of the background advancement loop
    pub advance_interval_ms: u64,
    /// Run an advancement tick when a read finds the schedule stale
    pub advance_on_read: bool,
    /// Most tracks a single tick may advance through before re-anchoring
    pub max_catchup_tracks: usize,
    /// Play history rows kept per channel
    pub history_retention: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead_length: 5,
            crossfade_lead_ms: 10_000,
            anti_repeat_window: 5,
            weights: SelectionWeights::default(),
            advance_interval_ms: 1_000,
            advance_on_read: true,
            max_catchup_tracks: 64,
            history_retention: 500,
        }
    }
}

impl SchedulerConfig {
    /// Selection policy built from this configuration
    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy::new(self.weights.clone(), self.anti_repeat_window)
    }
}
