//! HTTP request handlers
//!
//! Every endpoint is a read. Listeners only ever see `playing` or `waiting`;
//! a store failure surfaces as 503 so clients retry instead of trusting a
//! guessed schedule.

use crate::api::server::AppContext;
use crate::error::Error;
use crate::schedule::{PlaybackState, Snapshot};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use onair_common::crossfade::{self, CrossfadeFrame, CurveSample};
use onair_common::time::now_ms;
use onair_common::Track;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

pub const DEFAULT_QUEUE_LIMIT: usize = 5;
pub const MAX_QUEUE_LIMIT: usize = 50;
pub const DEFAULT_CURVE_STEPS: usize = 32;
pub const MAX_CURVE_STEPS: usize = 1024;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BuildInfoResponse {
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
    build_profile: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackInfo {
    id: Uuid,
    title: String,
    artist: String,
    duration_ms: i64,
}

impl From<&Track> for TrackInfo {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id,
            title: track.title.clone(),
            artist: track.artist.clone(),
            duration_ms: track.duration_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NowPlayingResponse {
    /// "playing" or "waiting"
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    track: Option<TrackInfo>,
    /// Epoch milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<i64>,
    /// Epoch milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    ends_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_track: Option<TrackInfo>,
    /// Gains at `server_time_ms`, present with `next_track`
    #[serde(skip_serializing_if = "Option::is_none")]
    crossfade: Option<CrossfadeFrame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    crossfade_lead_ms: i64,
    server_time_ms: i64,
}

#[derive(Debug, Deserialize)]
pub struct QueueParams {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    tracks: Vec<TrackInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    currently_playing: Option<TrackInfo>,
}

#[derive(Debug, Deserialize)]
pub struct CurveParams {
    steps: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CurveResponse {
    lead_ms: i64,
    frames: Vec<CurveSample>,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn error_response(context: &str, e: Error) -> ApiError {
    if e.is_retryable() {
        warn!("{}: {}", context, e);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(StatusResponse {
                status: "unavailable".to_string(),
                message: "Schedule store is unavailable, retry shortly".to_string(),
            }),
        )
    } else {
        error!("{}: {}", context, e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(StatusResponse {
                status: "error".to_string(),
                message: e.to_string(),
            }),
        )
    }
}

// ============================================================================
// Health Endpoints
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "onair-sched".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /build_info
pub async fn build_info() -> Json<BuildInfoResponse> {
    Json(BuildInfoResponse {
        module: "onair-sched".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
        build_profile: env!("BUILD_PROFILE").to_string(),
    })
}

// ============================================================================
// Schedule Endpoints
// ============================================================================

/// GET /now-playing
pub async fn now_playing(
    State(ctx): State<AppContext>,
) -> Result<Json<NowPlayingResponse>, ApiError> {
    let now = now_ms();
    let state = ctx
        .scheduler
        .now_playing(now)
        .await
        .map_err(|e| error_response("Failed to resolve now playing", e))?;

    Ok(Json(now_playing_response(
        &state,
        now,
        ctx.scheduler.config().crossfade_lead_ms,
    )))
}

fn now_playing_response(state: &PlaybackState, now: i64, lead_ms: i64) -> NowPlayingResponse {
    match state {
        PlaybackState::Playing {
            track,
            started_at_ms,
            elapsed_ms,
            remaining_ms,
            next_track,
        } => {
            let ends_at = track.ends_at(*started_at_ms);
            let crossfade = next_track
                .as_ref()
                .map(|_| crossfade::gains(crossfade::position_in_window(now, ends_at, lead_ms)));

            NowPlayingResponse {
                state: "playing",
                track: Some(TrackInfo::from(track)),
                started_at: Some(*started_at_ms),
                ends_at: Some(ends_at),
                elapsed_ms: Some(*elapsed_ms),
                remaining_ms: Some(*remaining_ms),
                next_track: next_track.as_ref().map(TrackInfo::from),
                crossfade,
                message: None,
                crossfade_lead_ms: lead_ms,
                server_time_ms: now,
            }
        }
        PlaybackState::Waiting { reason } => NowPlayingResponse {
            state: "waiting",
            track: None,
            started_at: None,
            ends_at: None,
            elapsed_ms: None,
            remaining_ms: None,
            next_track: None,
            crossfade: None,
            message: Some(reason.message()),
            crossfade_lead_ms: lead_ms,
            server_time_ms: now,
        },
    }
}

/// GET /queue?limit=N
///
/// Peeks at the committed queue; never consumes it.
pub async fn queue(
    State(ctx): State<AppContext>,
    Query(params): Query<QueueParams>,
) -> Result<Json<QueueResponse>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_QUEUE_LIMIT)
        .min(MAX_QUEUE_LIMIT);

    let Snapshot { state, upcoming } = ctx
        .scheduler
        .snapshot(now_ms())
        .await
        .map_err(|e| error_response("Failed to read queue", e))?;

    Ok(Json(QueueResponse {
        tracks: upcoming.iter().take(limit).map(TrackInfo::from).collect(),
        currently_playing: state.current_track().map(TrackInfo::from),
    }))
}

/// GET /crossfade/curve?steps=N
pub async fn crossfade_curve(
    State(ctx): State<AppContext>,
    Query(params): Query<CurveParams>,
) -> Json<CurveResponse> {
    let steps = params
        .steps
        .unwrap_or(DEFAULT_CURVE_STEPS)
        .clamp(1, MAX_CURVE_STEPS);

    Json(CurveResponse {
        lead_ms: ctx.scheduler.config().crossfade_lead_ms,
        frames: crossfade::sample_curve(steps),
    })
}
