//! Settings database access
//!
//! Read/write settings from the settings table (key-value store). Scheduling
//! policy is database-first so every instance sharing the database agrees on
//! it; out-of-range stored values are clamped rather than rejected.

use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::schedule::selection::SelectionWeights;
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::warn;

pub const LOOKAHEAD_LENGTH: &str = "lookahead_length";
pub const CROSSFADE_LEAD_MS: &str = "crossfade_lead_ms";
pub const ANTI_REPEAT_WINDOW: &str = "anti_repeat_window";
pub const WEIGHT_PLAY_COUNT: &str = "weight_play_count";
pub const WEIGHT_TIPS: &str = "weight_tips";
pub const WEIGHT_FRESHNESS: &str = "weight_freshness";
pub const FRESHNESS_DECAY_MS: &str = "freshness_decay_ms";
pub const ADVANCE_INTERVAL_MS: &str = "advance_interval_ms";
pub const ADVANCE_ON_READ: &str = "advance_on_read";
pub const MAX_CATCHUP_TRACKS: &str = "max_catchup_tracks";
pub const HISTORY_RETENTION: &str = "history_retention";

/// Load the scheduling policy, falling back to defaults for missing keys
pub async fn load_scheduler_config(db: &Pool<Sqlite>) -> Result<SchedulerConfig> {
    let defaults = SchedulerConfig::default();

    let lookahead_length = clamped(
        LOOKAHEAD_LENGTH,
        get_setting::<usize>(db, LOOKAHEAD_LENGTH).await?,
        defaults.lookahead_length,
        1,
        50,
    );
    let crossfade_lead_ms = clamped(
        CROSSFADE_LEAD_MS,
        get_setting::<i64>(db, CROSSFADE_LEAD_MS).await?,
        defaults.crossfade_lead_ms,
        0,
        120_000,
    );
    let anti_repeat_window = clamped(
        ANTI_REPEAT_WINDOW,
        get_setting::<usize>(db, ANTI_REPEAT_WINDOW).await?,
        defaults.anti_repeat_window,
        0,
        500,
    );

    let weights = SelectionWeights {
        play_count: non_negative(
            WEIGHT_PLAY_COUNT,
            get_setting::<f64>(db, WEIGHT_PLAY_COUNT).await?,
            defaults.weights.play_count,
        ),
        tips: non_negative(
            WEIGHT_TIPS,
            get_setting::<f64>(db, WEIGHT_TIPS).await?,
            defaults.weights.tips,
        ),
        freshness: non_negative(
            WEIGHT_FRESHNESS,
            get_setting::<f64>(db, WEIGHT_FRESHNESS).await?,
            defaults.weights.freshness,
        ),
        freshness_decay_ms: clamped(
            FRESHNESS_DECAY_MS,
            get_setting::<i64>(db, FRESHNESS_DECAY_MS).await?,
            defaults.weights.freshness_decay_ms,
            1,
            i64::MAX,
        ),
    };

    let advance_interval_ms = clamped(
        ADVANCE_INTERVAL_MS,
        get_setting::<u64>(db, ADVANCE_INTERVAL_MS).await?,
        defaults.advance_interval_ms,
        100,
        60_000,
    );
    let advance_on_read = get_setting::<bool>(db, ADVANCE_ON_READ)
        .await?
        .unwrap_or(defaults.advance_on_read);
    let max_catchup_tracks = clamped(
        MAX_CATCHUP_TRACKS,
        get_setting::<usize>(db, MAX_CATCHUP_TRACKS).await?,
        defaults.max_catchup_tracks,
        1,
        10_000,
    );
    let history_retention = clamped(
        HISTORY_RETENTION,
        get_setting::<i64>(db, HISTORY_RETENTION).await?,
        defaults.history_retention,
        10,
        100_000,
    );

    Ok(SchedulerConfig {
        lookahead_length,
        crossfade_lead_ms,
        anti_repeat_window,
        weights,
        advance_interval_ms,
        advance_on_read,
        max_catchup_tracks,
        history_retention,
    })
}

fn clamped<T: PartialOrd + Copy + std::fmt::Display>(
    key: &str,
    value: Option<T>,
    default: T,
    min: T,
    max: T,
) -> T {
    let value = value.unwrap_or(default);
    if value < min {
        warn!("Setting '{}' = {} below minimum, using {}", key, value, min);
        min
    } else if value > max {
        warn!("Setting '{}' = {} above maximum, using {}", key, value, max);
        max
    } else {
        value
    }
}

fn non_negative(key: &str, value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => v,
        Some(v) => {
            warn!("Setting '{}' = {} is not a non-negative number, using 0", key, v);
            0.0
        }
        None => default,
    }
}

/// Generic setting getter
///
/// Returns `None` when the key is missing or its value is NULL.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;

    match value.flatten() {
        Some(s) => match s.trim().parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter
///
/// Inserts or updates setting in database.
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}
