//! Position resolver
//!
//! Maps the committed anchor and a wall-clock instant to what every listener
//! should hear at that instant. Pure: identical inputs give identical output,
//! so any number of stateless readers agree without coordinating.

use super::anchor::ScheduleAnchor;
use onair_common::Track;
use std::collections::HashMap;
use uuid::Uuid;

/// Observable broadcast state at one instant
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackState {
    Playing {
        track: Track,
        started_at_ms: i64,
        elapsed_ms: i64,
        remaining_ms: i64,
        /// Present only inside the crossfade lead window
        next_track: Option<Track>,
    },
    Waiting {
        reason: WaitReason,
    },
}

/// Why no track can be reported as playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// The active track's start lies in the future (clock skew between
    /// instances, or a read racing a fresh commit)
    NotStarted { starts_in_ms: i64 },
    /// The active track has ended and the next one is not committed yet
    TrackEnded,
    /// The active track is no longer in the catalog
    TrackUnavailable,
    /// No schedule has been committed for the channel
    Unscheduled,
    /// The catalog has no tracks
    EmptyCatalog,
}

impl WaitReason {
    /// Listener-facing explanation
    pub fn message(&self) -> String {
        match self {
            WaitReason::NotStarted { starts_in_ms } => format!(
                "Next track starts in {:.1} seconds",
                *starts_in_ms as f64 / 1000.0
            ),
            WaitReason::TrackEnded => {
                "Switching to the next track, check back in a moment".to_string()
            }
            WaitReason::TrackUnavailable => {
                "The scheduled track is no longer available, picking another".to_string()
            }
            WaitReason::Unscheduled => "The broadcast is starting up".to_string(),
            WaitReason::EmptyCatalog => {
                "No tracks have been submitted yet, the broadcast starts with the first one"
                    .to_string()
            }
        }
    }

    /// True when an advancement tick could change the answer right away
    pub fn needs_advance(&self) -> bool {
        matches!(
            self,
            WaitReason::TrackEnded | WaitReason::TrackUnavailable | WaitReason::Unscheduled
        )
    }
}

impl PlaybackState {
    pub fn waiting(reason: WaitReason) -> Self {
        PlaybackState::Waiting { reason }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing { .. })
    }

    pub fn current_track(&self) -> Option<&Track> {
        match self {
            PlaybackState::Playing { track, .. } => Some(track),
            PlaybackState::Waiting { .. } => None,
        }
    }

    pub fn needs_advance(&self) -> bool {
        match self {
            PlaybackState::Waiting { reason } => reason.needs_advance(),
            PlaybackState::Playing { .. } => false,
        }
    }
}

/// Resolve the broadcast state at `now_ms`
///
/// `tracks` must contain the active track and the queued tracks; queued ids
/// missing from it are skipped when looking for the next track, the same way
/// advancement skips them. A track is never reported past its nominal end.
pub fn resolve(
    anchor: &ScheduleAnchor,
    tracks: &HashMap<Uuid, Track>,
    now_ms: i64,
    crossfade_lead_ms: i64,
) -> PlaybackState {
    let Some(active) = tracks.get(&anchor.active_track_id) else {
        return PlaybackState::waiting(WaitReason::TrackUnavailable);
    };

    let elapsed_ms = now_ms - anchor.started_at_ms;
    if elapsed_ms < 0 {
        return PlaybackState::waiting(WaitReason::NotStarted {
            starts_in_ms: -elapsed_ms,
        });
    }
    if elapsed_ms >= active.duration_ms {
        return PlaybackState::waiting(WaitReason::TrackEnded);
    }

    let remaining_ms = active.duration_ms - elapsed_ms;
    let next_track = if remaining_ms <= crossfade_lead_ms {
        anchor
            .committed_queue
            .iter()
            .find_map(|id| tracks.get(id))
            .cloned()
    } else {
        None
    };

    PlaybackState::Playing {
        track: active.clone(),
        started_at_ms: anchor.started_at_ms,
        elapsed_ms,
        remaining_ms,
        next_track,
    }
}
