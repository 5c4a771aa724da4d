//! Equal-power crossfade curve
//!
//! Maps a normalized transition position to a pair of gains for the outgoing
//! and incoming track. Both gains follow a quarter cosine, so the summed power
//! `out² + in²` stays at 1.0 across the whole transition and the mix has no
//! loudness dip at the midpoint (a linear crossfade drops to -3 dB there).
//!
//! The curve knows nothing about tracks or timing. Callers map wall-clock
//! progress through the crossfade lead window into a position, for example
//! with [`position_in_window`].

use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Gains for one instant of a crossfade
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossfadeFrame {
    /// Multiplier for the track that is ending (1.0 = full volume)
    pub gain_outgoing: f64,
    /// Multiplier for the track that is starting (1.0 = full volume)
    pub gain_incoming: f64,
}

impl CrossfadeFrame {
    /// Summed instantaneous power of both tracks
    pub fn power(&self) -> f64 {
        self.gain_outgoing * self.gain_outgoing + self.gain_incoming * self.gain_incoming
    }
}

/// One sample of the curve, used when shipping the curve to clients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveSample {
    pub position: f64,
    #[serde(flatten)]
    pub frame: CrossfadeFrame,
}

/// Gains at `position` through the transition
///
/// `position` is clamped to [0, 1]; NaN is treated as 0 (transition not
/// started).
pub fn gains(position: f64) -> CrossfadeFrame {
    let t = if position.is_nan() {
        0.0
    } else {
        position.clamp(0.0, 1.0)
    };

    CrossfadeFrame {
        gain_outgoing: (t * FRAC_PI_2).cos(),
        gain_incoming: ((1.0 - t) * FRAC_PI_2).cos(),
    }
}

/// Evenly spaced samples of the curve, both endpoints included
///
/// `steps` is the number of intervals; at least one interval is produced.
pub fn sample_curve(steps: usize) -> Vec<CurveSample> {
    let steps = steps.max(1);
    (0..=steps)
        .map(|i| {
            let position = i as f64 / steps as f64;
            CurveSample {
                position,
                frame: gains(position),
            }
        })
        .collect()
}

/// Progress through the lead window that ends at `ends_at_ms`
///
/// Returns 0.0 before the window opens and 1.0 once the outgoing track has
/// ended. A zero-length window jumps straight from 0.0 to 1.0 at the boundary.
pub fn position_in_window(now_ms: i64, ends_at_ms: i64, lead_ms: i64) -> f64 {
    if lead_ms <= 0 {
        return if now_ms >= ends_at_ms { 1.0 } else { 0.0 };
    }
    let window_start = ends_at_ms - lead_ms;
    let progress = (now_ms - window_start) as f64 / lead_ms as f64;
    progress.clamp(0.0, 1.0)
}
