//! Play history
//!
//! Every track activation is appended here. The selection policy reads the
//! tail to enforce the anti-repeat window across restarts.

use crate::error::{Error, Result};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

/// Record that `track_id` became active on `channel`
pub async fn append_play(
    db: &Pool<Sqlite>,
    channel: &str,
    track_id: Uuid,
    started_at_ms: i64,
) -> Result<()> {
    sqlx::query("INSERT INTO play_history (channel, track_id, started_at_ms) VALUES (?, ?, ?)")
        .bind(channel)
        .bind(track_id.to_string())
        .bind(started_at_ms)
        .execute(db)
        .await?;
    Ok(())
}

/// The `limit` most recent activations on `channel`, oldest first
pub async fn recent_track_ids(db: &Pool<Sqlite>, channel: &str, limit: i64) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT track_id FROM (
            SELECT id, track_id FROM play_history
            WHERE channel = ?
            ORDER BY id DESC
            LIMIT ?
        )
        ORDER BY id ASC
        "#,
    )
    .bind(channel)
    .bind(limit)
    .fetch_all(db)
    .await?;

    ids.iter()
        .map(|s| {
            Uuid::parse_str(s)
                .map_err(|e| Error::Internal(format!("Invalid history track id '{}': {}", s, e)))
        })
        .collect()
}

/// Keep only the newest `retain` rows for `channel`; returns rows deleted
pub async fn prune_history(db: &Pool<Sqlite>, channel: &str, retain: i64) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM play_history
        WHERE channel = ?
          AND id <= (
            SELECT id FROM play_history
            WHERE channel = ?
            ORDER BY id DESC
            LIMIT 1 OFFSET ?
          )
        "#,
    )
    .bind(channel)
    .bind(channel)
    .bind(retain)
    .execute(db)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_temp() -> (tempfile::TempDir, Pool<Sqlite>) {
        let dir = tempfile::tempdir().unwrap();
        let pool = onair_common::db::init_database(&dir.path().join("onair.db"))
            .await
            .unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn test_recent_is_oldest_first_and_limited() {
        let (_dir, db) = open_temp().await;
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            append_play(&db, "main", *id, i as i64 * 1000).await.unwrap();
        }
        append_play(&db, "other", Uuid::new_v4(), 0).await.unwrap();

        let recent = recent_track_ids(&db, "main", 3).await.unwrap();
        assert_eq!(recent, ids[2..].to_vec());
    }

    #[tokio::test]
    async fn test_prune_keeps_newest() {
        let (_dir, db) = open_temp().await;
        let ids: Vec<Uuid> = (0..12).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            append_play(&db, "main", *id, 0).await.unwrap();
        }
        let other = Uuid::new_v4();
        append_play(&db, "other", other, 0).await.unwrap();

        assert_eq!(prune_history(&db, "main", 10).await.unwrap(), 2);
        assert_eq!(prune_history(&db, "main", 10).await.unwrap(), 0);

        let recent = recent_track_ids(&db, "main", 100).await.unwrap();
        assert_eq!(recent, ids[2..].to_vec());
        assert_eq!(recent_track_ids(&db, "other", 100).await.unwrap(), vec![other]);
    }
}
