//! Playback position and current-episode persistence

use crate::catalog::EpisodeKey;
use crate::{Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::str::FromStr;

const CURRENT_EPISODE_KEY: &str = "current_episode";

/// Saved position within one episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackRecord {
    pub episode_number: u32,
    /// Seconds from the start of the episode
    pub playback_position: i64,
}

/// Fetch the record for an episode, inserting a zero position if absent
pub async fn get_or_create_position(db: &SqlitePool, episode: EpisodeKey) -> Result<PlaybackRecord> {
    sqlx::query(
        r#"
        INSERT INTO episode_playback (episode_number, playback_position, updated_at)
        VALUES (?, 0, ?)
        ON CONFLICT(episode_number) DO NOTHING
        "#,
    )
    .bind(episode.number().to_string())
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(db)
    .await?;

    let position: i64 = sqlx::query_scalar(
        "SELECT playback_position FROM episode_playback WHERE episode_number = ?",
    )
    .bind(episode.number().to_string())
    .fetch_one(db)
    .await?;

    Ok(PlaybackRecord {
        episode_number: episode.number(),
        playback_position: position,
    })
}

/// Store the position (seconds) for an episode
pub async fn set_position(db: &SqlitePool, episode: EpisodeKey, position_secs: i64) -> Result<()> {
    if position_secs < 0 {
        return Err(Error::InvalidInput(format!(
            "Playback position must not be negative: {}",
            position_secs
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO episode_playback (episode_number, playback_position, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(episode_number) DO UPDATE SET
            playback_position = excluded.playback_position,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(episode.number().to_string())
    .bind(position_secs)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(db)
    .await?;

    Ok(())
}

/// Episode the listener was last on; initialised to episode 1
pub async fn get_current_episode(db: &SqlitePool) -> Result<EpisodeKey> {
    match get_setting::<u32>(db, CURRENT_EPISODE_KEY).await? {
        Some(number) => Ok(EpisodeKey::new(number)),
        None => {
            set_setting(db, CURRENT_EPISODE_KEY, 1).await?;
            Ok(EpisodeKey::new(1))
        }
    }
}

pub async fn set_current_episode(db: &SqlitePool, episode: EpisodeKey) -> Result<()> {
    set_setting(db, CURRENT_EPISODE_KEY, episode.number()).await
}

/// Generic setting getter
pub async fn get_setting<T: FromStr>(db: &SqlitePool, key: &str) -> Result<Option<T>> {
    let value = sqlx::query_scalar::<_, Option<String>>("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?
        .flatten();

    match value {
        Some(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("Failed to parse setting '{}' value: {}", key, s))),
        None => Ok(None),
    }
}

/// Generic setting setter (insert or update)
pub async fn set_setting<T: ToString>(db: &SqlitePool, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}
