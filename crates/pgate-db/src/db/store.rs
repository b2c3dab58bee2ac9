//! SQLite-backed durable store.
//!
//! One pool, one writer (`max_connections = 1`); every public operation is a
//! single statement or an explicit transaction, so calls are atomic. All
//! timestamps are stored as fixed-width UTC text, which makes the window
//! comparisons plain string comparisons.

use chrono::{Duration as ChronoDuration, Utc};
use log::info;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::db::types::{
    ConnectionStats, DbError, DbErrorKind, DbResult, QueryLog, QueryRecord, QueryStats, RateStatus,
};

/// Fixed-width UTC timestamp, sortable as text.
pub(crate) fn now_ts() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

pub(crate) fn ts_ago(delta: ChronoDuration) -> String {
    (Utc::now() - delta).format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Handle to the gateway database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn open(path: &str) -> DbResult<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbError::new(DbErrorKind::ConnectionFailed, e.to_string()))?;
            }
        }

        let url = format!("sqlite://{}?mode=rwc", path);
        let pool = SqlitePoolOptions::new()
            .max_connections(1) // SQLite single-writer
            .connect(&url)
            .await
            .map_err(|e| {
                DbError::new(DbErrorKind::ConnectionFailed, format!("SQLite connect: {e}"))
            })?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await.ok();
        sqlx::query("PRAGMA busy_timeout=5000").execute(&pool).await.ok();
        sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await.ok();

        let db = Self { pool };
        db.init_schema().await?;
        info!("[db] opened {}", path);
        Ok(db)
    }

    /// In-memory database for tests.
    pub async fn open_in_memory() -> DbResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                DbError::new(DbErrorKind::ConnectionFailed, format!("SQLite connect: {e}"))
            })?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init_schema(&self) -> DbResult<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                callsign TEXT NOT NULL,
                connected_at TEXT NOT NULL,
                disconnected_at TEXT,
                duration_seconds INTEGER,
                packets_sent INTEGER DEFAULT 0,
                packets_received INTEGER DEFAULT 0,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            "CREATE TABLE IF NOT EXISTS queries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                connection_id INTEGER,
                callsign TEXT NOT NULL,
                query TEXT NOT NULL,
                response TEXT,
                tokens_used INTEGER,
                response_time_ms INTEGER,
                error TEXT,
                timestamp TEXT NOT NULL,
                FOREIGN KEY (connection_id) REFERENCES connections(id)
            )",
            "CREATE TABLE IF NOT EXISTS rate_limits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                callsign TEXT NOT NULL,
                query_count INTEGER DEFAULT 1,
                window_start TEXT NOT NULL,
                window_end TEXT NOT NULL,
                last_query TEXT,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            "CREATE TABLE IF NOT EXISTS errors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                callsign TEXT,
                error_type TEXT NOT NULL,
                error_message TEXT NOT NULL,
                context TEXT,
                timestamp TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                from_callsign TEXT NOT NULL,
                to_callsign TEXT NOT NULL,
                subject TEXT NOT NULL,
                body TEXT NOT NULL,
                is_read INTEGER DEFAULT 0,
                in_reply_to INTEGER,
                created_at TEXT NOT NULL,
                read_at TEXT,
                deleted_at TEXT,
                FOREIGN KEY (in_reply_to) REFERENCES messages(id)
            )",
            "CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                file_data BLOB NOT NULL,
                file_size INTEGER NOT NULL,
                mime_type TEXT,
                checksum TEXT NOT NULL,
                owner_callsign TEXT NOT NULL,
                access_level TEXT NOT NULL DEFAULT 'private',
                description TEXT,
                uploaded_at TEXT NOT NULL,
                download_count INTEGER DEFAULT 0
            )",
            "CREATE TABLE IF NOT EXISTS file_shares (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id INTEGER NOT NULL,
                shared_with_callsign TEXT NOT NULL,
                shared_by_callsign TEXT NOT NULL,
                shared_at TEXT NOT NULL,
                UNIQUE (file_id, shared_with_callsign),
                FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
            )",
            "CREATE TABLE IF NOT EXISTS channels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                topic TEXT,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel_id INTEGER NOT NULL,
                callsign TEXT NOT NULL,
                message TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE
            )",
            "CREATE TABLE IF NOT EXISTS channel_presence (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel_id INTEGER NOT NULL,
                callsign TEXT NOT NULL,
                joined_at TEXT NOT NULL,
                last_active TEXT NOT NULL,
                UNIQUE (channel_id, callsign),
                FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE
            )",
            "CREATE INDEX IF NOT EXISTS idx_connections_callsign ON connections(callsign)",
            "CREATE INDEX IF NOT EXISTS idx_queries_callsign ON queries(callsign)",
            "CREATE INDEX IF NOT EXISTS idx_queries_timestamp ON queries(timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_rate_limits_callsign ON rate_limits(callsign)",
            "CREATE INDEX IF NOT EXISTS idx_errors_timestamp ON errors(timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_messages_to_callsign ON messages(to_callsign)",
            "CREATE INDEX IF NOT EXISTS idx_messages_from_callsign ON messages(from_callsign)",
            "CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_files_owner_callsign ON files(owner_callsign)",
            "CREATE INDEX IF NOT EXISTS idx_files_access_level ON files(access_level)",
            "CREATE INDEX IF NOT EXISTS idx_file_shares_file_id ON file_shares(file_id)",
            "CREATE INDEX IF NOT EXISTS idx_file_shares_shared_with ON file_shares(shared_with_callsign)",
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_channel ON chat_messages(channel_id)",
            "CREATE INDEX IF NOT EXISTS idx_channel_presence_callsign ON channel_presence(callsign)",
        ];

        for sql in statements {
            sqlx::query(sql).execute(&self.pool).await.map_err(DbError::from)?;
        }
        Ok(())
    }

    // ── Connection logging ──────────────────────────────────────────

    pub async fn log_connection(&self, callsign: &str) -> DbResult<i64> {
        let result = sqlx::query("INSERT INTO connections (callsign, connected_at) VALUES (?, ?)")
            .bind(callsign.to_uppercase())
            .bind(now_ts())
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(result.last_insert_rowid())
    }

    pub async fn log_disconnection(
        &self,
        connection_id: i64,
        packets_sent: i64,
        packets_received: i64,
    ) -> DbResult<()> {
        let connected_at: Option<String> =
            sqlx::query_scalar("SELECT connected_at FROM connections WHERE id = ?")
                .bind(connection_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(DbError::from)?;

        let Some(connected_at) = connected_at else {
            return Ok(());
        };

        let duration = chrono::NaiveDateTime::parse_from_str(&connected_at, "%Y-%m-%d %H:%M:%S%.6f")
            .ok()
            .map(|start| (Utc::now().naive_utc() - start).num_seconds())
            .unwrap_or(0);

        sqlx::query(
            "UPDATE connections
             SET disconnected_at = ?, duration_seconds = ?, packets_sent = ?, packets_received = ?
             WHERE id = ?",
        )
        .bind(now_ts())
        .bind(duration)
        .bind(packets_sent)
        .bind(packets_received)
        .bind(connection_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(())
    }

    // ── Query logging ───────────────────────────────────────────────

    pub async fn log_query(&self, callsign: &str, query: &str, log: QueryLog) -> DbResult<i64> {
        let result = sqlx::query(
            "INSERT INTO queries
             (connection_id, callsign, query, response, tokens_used, response_time_ms, error, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(log.connection_id)
        .bind(callsign.to_uppercase())
        .bind(query)
        .bind(log.response)
        .bind(log.tokens_used)
        .bind(log.response_time_ms)
        .bind(log.error)
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(result.last_insert_rowid())
    }

    // ── Rate limiting ───────────────────────────────────────────────

    async fn successful_queries_since(&self, callsign: &str, since: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM queries WHERE callsign = ? AND timestamp > ? AND error IS NULL",
        )
        .bind(callsign.to_uppercase())
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(count)
    }

    /// Sliding-window admission over successful queries.
    pub async fn check_rate_limit(
        &self,
        callsign: &str,
        queries_per_hour: i64,
        queries_per_day: i64,
    ) -> DbResult<(bool, Option<String>)> {
        let hourly = self
            .successful_queries_since(callsign, &ts_ago(ChronoDuration::hours(1)))
            .await?;
        if hourly >= queries_per_hour {
            return Ok((false, Some(format!("Hourly limit reached ({}/hour)", queries_per_hour))));
        }

        let daily = self
            .successful_queries_since(callsign, &ts_ago(ChronoDuration::days(1)))
            .await?;
        if daily >= queries_per_day {
            return Ok((false, Some(format!("Daily limit reached ({}/day)", queries_per_day))));
        }

        Ok((true, None))
    }

    pub async fn rate_limit_status(
        &self,
        callsign: &str,
        queries_per_hour: i64,
        queries_per_day: i64,
    ) -> DbResult<RateStatus> {
        let hourly = self
            .successful_queries_since(callsign, &ts_ago(ChronoDuration::hours(1)))
            .await?;
        let daily = self
            .successful_queries_since(callsign, &ts_ago(ChronoDuration::days(1)))
            .await?;

        Ok(RateStatus {
            hourly_used: hourly,
            hourly_limit: queries_per_hour,
            hourly_remaining: (queries_per_hour - hourly).max(0),
            daily_used: daily,
            daily_limit: queries_per_day,
            daily_remaining: (queries_per_day - daily).max(0),
        })
    }

    // ── Error logging ───────────────────────────────────────────────

    pub async fn log_error(
        &self,
        error_type: &str,
        error_message: &str,
        callsign: Option<&str>,
        context: Option<serde_json::Value>,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO errors (callsign, error_type, error_message, context, timestamp)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(callsign.map(|c| c.to_uppercase()))
        .bind(error_type)
        .bind(error_message)
        .bind(context.map(|c| c.to_string()))
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(())
    }

    // ── Statistics ──────────────────────────────────────────────────

    pub async fn connection_stats(&self, callsign: Option<&str>) -> DbResult<ConnectionStats> {
        let sql = if callsign.is_some() {
            "SELECT COUNT(*) AS total, AVG(duration_seconds) AS avg_dur,
                    COALESCE(SUM(packets_sent), 0) AS sent,
                    COALESCE(SUM(packets_received), 0) AS rcvd
             FROM connections WHERE callsign = ?"
        } else {
            "SELECT COUNT(*) AS total, AVG(duration_seconds) AS avg_dur,
                    COALESCE(SUM(packets_sent), 0) AS sent,
                    COALESCE(SUM(packets_received), 0) AS rcvd
             FROM connections"
        };

        let mut q = sqlx::query(sql);
        if let Some(cs) = callsign {
            q = q.bind(cs.to_uppercase());
        }
        let row: SqliteRow = q.fetch_one(&self.pool).await.map_err(DbError::from)?;

        Ok(ConnectionStats {
            total_connections: row.try_get("total").unwrap_or(0),
            avg_duration_seconds: row.try_get("avg_dur").ok(),
            total_packets_sent: row.try_get("sent").unwrap_or(0),
            total_packets_received: row.try_get("rcvd").unwrap_or(0),
        })
    }

    pub async fn query_stats(&self, callsign: Option<&str>) -> DbResult<QueryStats> {
        let sql = if callsign.is_some() {
            "SELECT COUNT(*) AS total,
                    COUNT(CASE WHEN error IS NULL THEN 1 END) AS ok,
                    COUNT(CASE WHEN error IS NOT NULL THEN 1 END) AS failed,
                    AVG(tokens_used) AS avg_tokens,
                    AVG(response_time_ms) AS avg_ms
             FROM queries WHERE callsign = ?"
        } else {
            "SELECT COUNT(*) AS total,
                    COUNT(CASE WHEN error IS NULL THEN 1 END) AS ok,
                    COUNT(CASE WHEN error IS NOT NULL THEN 1 END) AS failed,
                    AVG(tokens_used) AS avg_tokens,
                    AVG(response_time_ms) AS avg_ms
             FROM queries"
        };

        let mut q = sqlx::query(sql);
        if let Some(cs) = callsign {
            q = q.bind(cs.to_uppercase());
        }
        let row: SqliteRow = q.fetch_one(&self.pool).await.map_err(DbError::from)?;

        Ok(QueryStats {
            total_queries: row.try_get("total").unwrap_or(0),
            successful_queries: row.try_get("ok").unwrap_or(0),
            failed_queries: row.try_get("failed").unwrap_or(0),
            avg_tokens: row.try_get("avg_tokens").ok(),
            avg_response_time_ms: row.try_get("avg_ms").ok(),
        })
    }

    pub async fn recent_queries(
        &self,
        limit: i64,
        callsign: Option<&str>,
    ) -> DbResult<Vec<QueryRecord>> {
        let sql = if callsign.is_some() {
            "SELECT id, callsign, query, response, tokens_used, response_time_ms, error, timestamp
             FROM queries WHERE callsign = ? ORDER BY timestamp DESC LIMIT ?"
        } else {
            "SELECT id, callsign, query, response, tokens_used, response_time_ms, error, timestamp
             FROM queries ORDER BY timestamp DESC LIMIT ?"
        };

        let mut q = sqlx::query(sql);
        if let Some(cs) = callsign {
            q = q.bind(cs.to_uppercase());
        }
        let rows = q.bind(limit).fetch_all(&self.pool).await.map_err(DbError::from)?;

        Ok(rows
            .iter()
            .map(|row| QueryRecord {
                id: row.try_get("id").unwrap_or(0),
                callsign: row.try_get("callsign").unwrap_or_default(),
                query: row.try_get("query").unwrap_or_default(),
                response: row.try_get("response").ok(),
                tokens_used: row.try_get("tokens_used").ok(),
                response_time_ms: row.try_get("response_time_ms").ok(),
                error: row.try_get("error").ok(),
                timestamp: row.try_get("timestamp").unwrap_or_default(),
            })
            .collect())
    }

    // ── Retention ───────────────────────────────────────────────────

    /// Drop queries, rate rows and errors older than the cutoff.
    pub async fn cleanup_old_data(&self, days: i64) -> DbResult<()> {
        let cutoff = ts_ago(ChronoDuration::days(days));

        sqlx::query("DELETE FROM queries WHERE timestamp < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
        sqlx::query("DELETE FROM rate_limits WHERE window_end < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
        sqlx::query("DELETE FROM errors WHERE timestamp < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    // ── Connections ─────────────────────────────────────────────────

    #[tokio::test]
    async fn connection_log_roundtrip() {
        let db = db().await;
        let id = db.log_connection("K0ASM").await.unwrap();
        assert!(id > 0);
        db.log_disconnection(id, 5, 7).await.unwrap();

        let stats = db.connection_stats(Some("K0ASM")).await.unwrap();
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.total_packets_sent, 5);
        assert_eq!(stats.total_packets_received, 7);
    }

    #[tokio::test]
    async fn disconnection_of_unknown_id_is_noop() {
        let db = db().await;
        db.log_disconnection(999, 0, 0).await.unwrap();
    }

    // ── Queries & rate limiting ─────────────────────────────────────

    #[tokio::test]
    async fn rate_limit_counts_only_successful() {
        let db = db().await;
        db.log_query("K0ASM", "a", QueryLog::default()).await.unwrap();
        db.log_query(
            "K0ASM",
            "b",
            QueryLog { error: Some("boom".into()), ..Default::default() },
        )
        .await
        .unwrap();

        let status = db.rate_limit_status("K0ASM", 10, 50).await.unwrap();
        assert_eq!(status.hourly_used, 1);
        assert_eq!(status.daily_used, 1);
    }

    #[tokio::test]
    async fn rate_limit_denies_at_hourly_quota() {
        let db = db().await;
        db.log_query("K0ASM", "a", QueryLog::default()).await.unwrap();
        db.log_query("K0ASM", "b", QueryLog::default()).await.unwrap();

        let (allowed, reason) = db.check_rate_limit("K0ASM", 2, 10).await.unwrap();
        assert!(!allowed);
        assert_eq!(reason.unwrap(), "Hourly limit reached (2/hour)");

        // Monotonic within the window: still denied.
        let (allowed, _) = db.check_rate_limit("K0ASM", 2, 10).await.unwrap();
        assert!(!allowed);
    }

    #[tokio::test]
    async fn rate_limit_denies_at_daily_quota() {
        let db = db().await;
        for i in 0..3 {
            db.log_query("K0ASM", &format!("q{i}"), QueryLog::default()).await.unwrap();
        }
        let (allowed, reason) = db.check_rate_limit("K0ASM", 100, 3).await.unwrap();
        assert!(!allowed);
        assert_eq!(reason.unwrap(), "Daily limit reached (3/day)");
    }

    #[tokio::test]
    async fn rate_limit_is_per_callsign() {
        let db = db().await;
        db.log_query("K0ASM", "a", QueryLog::default()).await.unwrap();
        let (allowed, _) = db.check_rate_limit("W1AW", 1, 10).await.unwrap();
        assert!(allowed);
    }

    #[tokio::test]
    async fn query_stats_aggregate() {
        let db = db().await;
        db.log_query(
            "K0ASM",
            "a",
            QueryLog { tokens_used: Some(100), response_time_ms: Some(50), ..Default::default() },
        )
        .await
        .unwrap();
        db.log_query(
            "K0ASM",
            "b",
            QueryLog { error: Some("x".into()), ..Default::default() },
        )
        .await
        .unwrap();

        let stats = db.query_stats(Some("K0ASM")).await.unwrap();
        assert_eq!(stats.total_queries, 2);
        assert_eq!(stats.successful_queries, 1);
        assert_eq!(stats.failed_queries, 1);
    }

    #[tokio::test]
    async fn recent_queries_newest_first() {
        let db = db().await;
        db.log_query("K0ASM", "first", QueryLog::default()).await.unwrap();
        db.log_query("K0ASM", "second", QueryLog::default()).await.unwrap();
        let recent = db.recent_queries(10, Some("K0ASM")).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].query, "second");
    }

    // ── Errors & retention ──────────────────────────────────────────

    #[tokio::test]
    async fn error_logging() {
        let db = db().await;
        db.log_error("TurnFailure", "timeout", Some("K0ASM"), None).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM errors")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn cleanup_drops_old_rows_only() {
        let db = db().await;
        db.log_query("K0ASM", "fresh", QueryLog::default()).await.unwrap();
        // Plant an old row directly.
        sqlx::query("INSERT INTO queries (callsign, query, timestamp) VALUES (?, ?, ?)")
            .bind("K0ASM")
            .bind("ancient")
            .bind("2000-01-01 00:00:00.000000")
            .execute(&db.pool)
            .await
            .unwrap();

        db.cleanup_old_data(30).await.unwrap();

        let remaining = db.recent_queries(10, Some("K0ASM")).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].query, "fresh");
    }
}
