//! Scheduler settings bootstrap

use super::settings::*;
use crate::config::SchedulerConfig;
use crate::error::Result;
use onair_common::db::ensure_setting;
use sqlx::{Pool, Sqlite};
use tracing::info;

/// Write default values for every scheduler setting that is missing or NULL
///
/// Existing values are never overwritten, so operators can tune the policy
/// in the database and restart.
pub async fn init_settings_defaults(pool: &Pool<Sqlite>) -> Result<()> {
    info!("Initializing default settings");

    let d = SchedulerConfig::default();
    let defaults = [
        (LOOKAHEAD_LENGTH, d.lookahead_length.to_string()),
        (CROSSFADE_LEAD_MS, d.crossfade_lead_ms.to_string()),
        (ANTI_REPEAT_WINDOW, d.anti_repeat_window.to_string()),
        (WEIGHT_PLAY_COUNT, d.weights.play_count.to_string()),
        (WEIGHT_TIPS, d.weights.tips.to_string()),
        (WEIGHT_FRESHNESS, d.weights.freshness.to_string()),
        (FRESHNESS_DECAY_MS, d.weights.freshness_decay_ms.to_string()),
        (ADVANCE_INTERVAL_MS, d.advance_interval_ms.to_string()),
        (ADVANCE_ON_READ, d.advance_on_read.to_string()),
        (MAX_CATCHUP_TRACKS, d.max_catchup_tracks.to_string()),
        (HISTORY_RETENTION, d.history_retention.to_string()),
    ];

    for (key, value) in &defaults {
        ensure_setting(pool, key, value).await?;
    }

    Ok(())
}
