//! Catalog track queries
//!
//! The catalog is written by the ingestion side; the scheduler reads
//! candidates and durations and bumps play counts.

use crate::error::{Error, Result};
use onair_common::Track;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

const TRACK_COLUMNS: &str =
    "guid, title, artist, duration_ms, play_count, tip_weight, created_at_ms";

fn track_from_row(row: &SqliteRow) -> Result<Track> {
    let guid: String = row.get("guid");
    let id = Uuid::parse_str(&guid)
        .map_err(|e| Error::Internal(format!("Invalid track guid '{}': {}", guid, e)))?;

    Ok(Track {
        id,
        title: row.get("title"),
        artist: row.get("artist"),
        duration_ms: row.get("duration_ms"),
        play_count: row.get("play_count"),
        tip_weight: row.get("tip_weight"),
        created_at_ms: row.get("created_at_ms"),
    })
}

/// Rows with an unreadable guid are logged and left out
fn collect_tracks(rows: &[SqliteRow]) -> Vec<Track> {
    rows.iter()
        .filter_map(|row| match track_from_row(row) {
            Ok(track) => Some(track),
            Err(e) => {
                warn!("Skipping catalog row: {}", e);
                None
            }
        })
        .collect()
}

/// Catalog tracks not listed in `exclude`
///
/// The scheduler passes an empty `exclude` and leaves anti-repeat exclusion
/// to the selection policy, which needs the full set to relax the exclusion
/// when it would leave nothing.
pub async fn list_candidates(db: &Pool<Sqlite>, exclude: &[Uuid]) -> Result<Vec<Track>> {
    let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM tracks", TRACK_COLUMNS));
    if !exclude.is_empty() {
        query.push(" WHERE guid NOT IN (");
        let mut separated = query.separated(", ");
        for id in exclude {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");
    }
    query.push(" ORDER BY created_at_ms, guid");

    let rows = query.build().fetch_all(db).await?;
    Ok(collect_tracks(&rows))
}

/// Look up tracks by id; ids not in the catalog are absent from the map
pub async fn get_tracks(db: &Pool<Sqlite>, ids: &[Uuid]) -> Result<HashMap<Uuid, Track>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut query = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {} FROM tracks WHERE guid IN (",
        TRACK_COLUMNS
    ));
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(")");

    let rows = query.build().fetch_all(db).await?;
    Ok(collect_tracks(&rows)
        .into_iter()
        .map(|t| (t.id, t))
        .collect())
}

/// Number of tracks in the catalog
pub async fn count_tracks(db: &Pool<Sqlite>) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tracks")
        .fetch_one(db)
        .await?;
    Ok(count)
}

/// Add a track to the catalog
pub async fn insert_track(db: &Pool<Sqlite>, track: &Track) -> Result<()> {
    if track.duration_ms <= 0 {
        return Err(Error::InvalidInput(format!(
            "Track {} has non-positive duration {}",
            track.id, track.duration_ms
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO tracks (guid, title, artist, duration_ms, play_count, tip_weight, created_at_ms)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(track.id.to_string())
    .bind(&track.title)
    .bind(&track.artist)
    .bind(track.duration_ms)
    .bind(track.play_count)
    .bind(track.tip_weight)
    .bind(track.created_at_ms)
    .execute(db)
    .await?;

    Ok(())
}

/// Remove a track from the catalog
///
/// Returns false when the track did not exist. Anchors and queues that
/// still reference it are repaired by the next advancement.
pub async fn delete_track(db: &Pool<Sqlite>, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tracks WHERE guid = ?")
        .bind(id.to_string())
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Record one more play of a track
pub async fn increment_play_count(db: &Pool<Sqlite>, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE tracks SET play_count = play_count + 1 WHERE guid = ?")
        .bind(id.to_string())
        .execute(db)
        .await?;
    Ok(())
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

    fn track(title: &str, duration_ms: i64, created_at_ms: i64) -> Track {
        Track {
            id: Uuid::new_v4(),
            title: title.to_string(),
            artist: "Various".to_string(),
            duration_ms,
            play_count: 0,
            tip_weight: 1.5,
            created_at_ms,
        }
    }

    #[tokio::test]
    async fn test_insert_and_list() {
        let (_dir, db) = open_temp().await;
        let a = track("A", 60_000, 1);
        let b = track("B", 30_000, 2);
        insert_track(&db, &b).await.unwrap();
        insert_track(&db, &a).await.unwrap();

        let tracks = list_candidates(&db, &[]).await.unwrap();
        assert_eq!(tracks, vec![a.clone(), b.clone()]);
        assert_eq!(count_tracks(&db).await.unwrap(), 2);

        let without_a = list_candidates(&db, &[a.id, Uuid::new_v4()]).await.unwrap();
        assert_eq!(without_a, vec![b]);
    }

    #[tokio::test]
    async fn test_get_tracks_omits_unknown_ids() {
        let (_dir, db) = open_temp().await;
        let a = track("A", 60_000, 1);
        insert_track(&db, &a).await.unwrap();

        let unknown = Uuid::new_v4();
        let found = get_tracks(&db, &[a.id, unknown]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found.get(&a.id), Some(&a));
        assert!(get_tracks(&db, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_positive_duration() {
        let (_dir, db) = open_temp().await;
        let result = insert_track(&db, &track("Zero", 0, 1)).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_play_count_and_delete() {
        let (_dir, db) = open_temp().await;
        let a = track("A", 60_000, 1);
        insert_track(&db, &a).await.unwrap();

        increment_play_count(&db, a.id).await.unwrap();
        increment_play_count(&db, a.id).await.unwrap();
        let found = get_tracks(&db, &[a.id]).await.unwrap();
        assert_eq!(found[&a.id].play_count, 2);

        assert!(delete_track(&db, a.id).await.unwrap());
        assert!(!delete_track(&db, a.id).await.unwrap());
        assert!(list_candidates(&db, &[]).await.unwrap().is_empty());
    }
}
