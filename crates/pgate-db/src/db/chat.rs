//! Multi-user chat: named channels, presence, message history.

use chrono::Duration as ChronoDuration;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::store::{now_ts, ts_ago, Database};
use crate::db::types::{ChannelRecord, ChatMessageRecord, DbError, DbResult};

fn row_to_channel(row: &SqliteRow) -> ChannelRecord {
    ChannelRecord {
        id: row.try_get("id").unwrap_or(0),
        name: row.try_get("name").unwrap_or_default(),
        topic: row.try_get("topic").ok(),
        created_by: row.try_get("created_by").unwrap_or_default(),
        created_at: row.try_get("created_at").unwrap_or_default(),
    }
}

impl Database {
    /// Look up a channel by name, creating it when missing. Channel names are
    /// upper-case.
    pub async fn get_or_create_channel(
        &self,
        name: &str,
        created_by: &str,
        topic: Option<&str>,
    ) -> DbResult<i64> {
        let name = name.to_uppercase();

        if let Some(id) = sqlx::query_scalar::<_, i64>("SELECT id FROM channels WHERE name = ?")
            .bind(&name)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?
        {
            return Ok(id);
        }

        let result = sqlx::query(
            "INSERT INTO channels (name, topic, created_by, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&name)
        .bind(topic)
        .bind(created_by.to_uppercase())
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        log::info!("[db] created chat channel {}", name);
        Ok(result.last_insert_rowid())
    }

    pub async fn get_channel_by_name(&self, name: &str) -> DbResult<Option<ChannelRecord>> {
        let row = sqlx::query(
            "SELECT id, name, topic, created_by, created_at FROM channels WHERE name = ?",
        )
        .bind(name.to_uppercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(row.as_ref().map(row_to_channel))
    }

    pub async fn list_channels(&self) -> DbResult<Vec<ChannelRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, topic, created_by, created_at FROM channels ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(rows.iter().map(row_to_channel).collect())
    }

    // ── Presence ────────────────────────────────────────────────────

    pub async fn join_channel(&self, channel_id: i64, callsign: &str) -> DbResult<()> {
        let now = now_ts();
        sqlx::query(
            "INSERT INTO channel_presence (channel_id, callsign, joined_at, last_active)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (channel_id, callsign) DO UPDATE SET last_active = excluded.last_active",
        )
        .bind(channel_id)
        .bind(callsign.to_uppercase())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(())
    }

    pub async fn leave_channel(&self, channel_id: i64, callsign: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM channel_presence WHERE channel_id = ? AND callsign = ?")
            .bind(channel_id)
            .bind(callsign.to_uppercase())
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(())
    }

    pub async fn leave_all_channels(&self, callsign: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM channel_presence WHERE callsign = ?")
            .bind(callsign.to_uppercase())
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(())
    }

    pub async fn get_channel_users(&self, channel_id: i64) -> DbResult<Vec<String>> {
        let users: Vec<String> = sqlx::query_scalar(
            "SELECT callsign FROM channel_presence WHERE channel_id = ? ORDER BY joined_at",
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(users)
    }

    /// Drop presence rows that have been inactive for `hours`.
    pub async fn cleanup_stale_presence(&self, hours: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM channel_presence WHERE last_active < ?")
            .bind(ts_ago(ChronoDuration::hours(hours)))
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(())
    }

    // ── Messages ────────────────────────────────────────────────────

    pub async fn post_chat_message(
        &self,
        channel_id: i64,
        callsign: &str,
        message: &str,
    ) -> DbResult<i64> {
        let cs = callsign.to_uppercase();
        let result = sqlx::query(
            "INSERT INTO chat_messages (channel_id, callsign, message, timestamp)
             VALUES (?, ?, ?, ?)",
        )
        .bind(channel_id)
        .bind(&cs)
        .bind(message)
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        // Posting refreshes presence activity.
        sqlx::query(
            "UPDATE channel_presence SET last_active = ? WHERE channel_id = ? AND callsign = ?",
        )
        .bind(now_ts())
        .bind(channel_id)
        .bind(&cs)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(result.last_insert_rowid())
    }

    /// The `limit` most recent messages within the `hours` window, oldest
    /// first for display.
    pub async fn get_recent_messages(
        &self,
        channel_id: i64,
        limit: i64,
        hours: i64,
    ) -> DbResult<Vec<ChatMessageRecord>> {
        let rows = sqlx::query(
            "SELECT id, channel_id, callsign, message, timestamp FROM chat_messages
             WHERE channel_id = ? AND timestamp > ?
             ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(channel_id)
        .bind(ts_ago(ChronoDuration::hours(hours)))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        let mut messages: Vec<ChatMessageRecord> = rows
            .iter()
            .map(|row| ChatMessageRecord {
                id: row.try_get("id").unwrap_or(0),
                channel_id: row.try_get("channel_id").unwrap_or(0),
                callsign: row.try_get("callsign").unwrap_or_default(),
                message: row.try_get("message").unwrap_or_default(),
                timestamp: row.try_get("timestamp").unwrap_or_default(),
            })
            .collect();
        messages.reverse();
        Ok(messages)
    }

    pub async fn set_channel_topic(&self, name: &str, topic: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE channels SET topic = ? WHERE name = ?")
            .bind(topic)
            .bind(name.to_uppercase())
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(result.rows_affected() > 0)
    }
}
