//! Schedule anchor persistence
//!
//! One row per channel in `schedule_anchor`. Writes are conditional on the
//! `updated_at_ms` token read by the writer, so of any number of instances
//! racing to advance the same anchor exactly one commit applies. Each write
//! is a single statement, which SQLite applies atomically.

use crate::error::{Error, Result};
use crate::schedule::anchor::{next_token, AnchorUpdate, CommitOutcome, ScheduleAnchor};
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

/// Read the committed anchor for `channel`, if one has been seeded
pub async fn read_anchor(db: &Pool<Sqlite>, channel: &str) -> Result<Option<ScheduleAnchor>> {
    let row = sqlx::query(
        r#"
        SELECT channel, active_track_id, started_at_ms, committed_queue, updated_at_ms
        FROM schedule_anchor
        WHERE channel = ?
        "#,
    )
    .bind(channel)
    .fetch_optional(db)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let active: String = row.get("active_track_id");
    let active_track_id = Uuid::parse_str(&active)
        .map_err(|e| Error::InvalidAnchor(format!("active track id '{}': {}", active, e)))?;

    let queue: String = row.get("committed_queue");
    let committed_queue: Vec<Uuid> = serde_json::from_str(&queue)
        .map_err(|e| Error::InvalidAnchor(format!("committed queue '{}': {}", queue, e)))?;

    Ok(Some(ScheduleAnchor {
        channel: row.get("channel"),
        active_track_id,
        started_at_ms: row.get("started_at_ms"),
        committed_queue,
        updated_at_ms: row.get("updated_at_ms"),
    }))
}

fn encode_queue(queue: &[Uuid]) -> Result<String> {
    serde_json::to_string(queue)
        .map_err(|e| Error::Internal(format!("Failed to encode committed queue: {}", e)))
}

/// Create the anchor for a channel that has none
///
/// Returns `Conflict` when another instance seeded it first.
pub async fn seed_anchor(
    db: &Pool<Sqlite>,
    channel: &str,
    update: &AnchorUpdate,
    now_ms: i64,
) -> Result<CommitOutcome> {
    let token = now_ms.max(1);

    let result = sqlx::query(
        r#"
        INSERT INTO schedule_anchor
            (channel, active_track_id, started_at_ms, committed_queue, updated_at_ms)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(channel) DO NOTHING
        "#,
    )
    .bind(channel)
    .bind(update.active_track_id.to_string())
    .bind(update.started_at_ms)
    .bind(encode_queue(&update.committed_queue)?)
    .bind(token)
    .execute(db)
    .await?;

    Ok(outcome(result.rows_affected(), token))
}

/// Replace the anchor if it still carries `expected_updated_at_ms`
///
/// A stale token means another writer committed in between; the caller must
/// re-read and re-plan rather than retry blindly.
pub async fn commit_advance(
    db: &Pool<Sqlite>,
    channel: &str,
    expected_updated_at_ms: i64,
    update: &AnchorUpdate,
    now_ms: i64,
) -> Result<CommitOutcome> {
    let token = next_token(expected_updated_at_ms, now_ms);

    let result = sqlx::query(
        r#"
        UPDATE schedule_anchor
        SET active_track_id = ?, started_at_ms = ?, committed_queue = ?, updated_at_ms = ?
        WHERE channel = ? AND updated_at_ms = ?
        "#,
    )
    .bind(update.active_track_id.to_string())
    .bind(update.started_at_ms)
    .bind(encode_queue(&update.committed_queue)?)
    .bind(token)
    .bind(channel)
    .bind(expected_updated_at_ms)
    .execute(db)
    .await?;

    Ok(outcome(result.rows_affected(), token))
}

fn outcome(rows_affected: u64, token: i64) -> CommitOutcome {
    if rows_affected == 1 {
        CommitOutcome::Committed {
            updated_at_ms: token,
        }
    } else {
        CommitOutcome::Conflict
    }
}
