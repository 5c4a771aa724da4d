//! Database initialization
//!
//! Opens (creating if needed) the SQLite database and creates every table
//! the broadcast services use. All statements are idempotent, so every
//! instance runs this on startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to every connection
///
/// Conditional anchor commits from concurrent instances wait on each other
/// for at most this long instead of failing with SQLITE_BUSY.
pub const BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas go on the connect options so every pooled connection gets them.
    // WAL lets listeners' reads proceed while an advance is being committed.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables on an already-open pool
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_tracks_table(pool).await?;
    create_schedule_anchor_table(pool).await?;
    create_play_history_table(pool).await?;
    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the tracks (catalog) table
pub async fn create_tracks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL DEFAULT '',
            artist TEXT NOT NULL DEFAULT '',
            duration_ms INTEGER NOT NULL CHECK (duration_ms > 0),
            play_count INTEGER NOT NULL DEFAULT 0,
            tip_weight REAL NOT NULL DEFAULT 0,
            created_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the schedule anchor table (one row per broadcast channel)
///
/// `committed_queue` holds a JSON array of track ids. `updated_at_ms` is the
/// optimistic concurrency token.
pub async fn create_schedule_anchor_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedule_anchor (
            channel TEXT PRIMARY KEY,
            active_track_id TEXT NOT NULL,
            started_at_ms INTEGER NOT NULL,
            committed_queue TEXT NOT NULL DEFAULT '[]',
            updated_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the play history table
pub async fn create_play_history_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS play_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            channel TEXT NOT NULL,
            track_id TEXT NOT NULL,
            started_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_play_history_channel ON play_history(channel, id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert a setting if it is missing, or reset it when its value is NULL
pub async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match value {
        None => {
            // INSERT OR IGNORE: another instance may be initializing concurrently
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;
            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
        Some(None) => {
            sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
                .bind(default_value)
                .bind(key)
                .execute(pool)
                .await?;
            info!("Reset NULL setting '{}' to default value: {}", key, default_value);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_temp() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("onair.db")).await.unwrap();
        (dir, pool)
    }

    async fn table_exists(pool: &SqlitePool, name: &str) -> bool {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_init_creates_all_tables() {
        let (_dir, pool) = open_temp().await;
        for table in ["settings", "tracks", "schedule_anchor", "play_history"] {
            assert!(table_exists(&pool, table).await, "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("onair.db");
        let pool = init_database(&path).await.unwrap();
        pool.close().await;
        let pool = init_database(&path).await.unwrap();
        assert!(table_exists(&pool, "schedule_anchor").await);
    }

    #[tokio::test]
    async fn test_tracks_reject_non_positive_duration() {
        let (_dir, pool) = open_temp().await;
        let result = sqlx::query(
            "INSERT INTO tracks (guid, duration_ms, created_at_ms) VALUES ('t1', 0, 0)",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ensure_setting_inserts_and_preserves() {
        let (_dir, pool) = open_temp().await;

        ensure_setting(&pool, "lookahead_length", "5").await.unwrap();
        sqlx::query("UPDATE settings SET value = '8' WHERE key = 'lookahead_length'")
            .execute(&pool)
            .await
            .unwrap();
        ensure_setting(&pool, "lookahead_length", "5").await.unwrap();

        let value: String =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = 'lookahead_length'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(value, "8");
    }

    #[tokio::test]
    async fn test_ensure_setting_resets_null() {
        let (_dir, pool) = open_temp().await;

        sqlx::query("INSERT INTO settings (key, value) VALUES ('crossfade_lead_ms', NULL)")
            .execute(&pool)
            .await
            .unwrap();
        ensure_setting(&pool, "crossfade_lead_ms", "10000").await.unwrap();

        let value: String =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = 'crossfade_lead_ms'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(value, "10000");
    }
}
