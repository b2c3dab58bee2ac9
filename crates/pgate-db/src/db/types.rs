//! Database records and error type.

use serde::{Deserialize, Serialize};
use std::fmt;

// ── Error type ──────────────────────────────────────────────────────────

/// Categorised database error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbError {
    pub kind: DbErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DbErrorKind {
    /// Could not open or create the database file.
    ConnectionFailed,
    /// A statement failed to execute.
    QueryFailed,
    /// The requested row does not exist (or is not visible to the caller).
    NotFound,
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    pub fn new(kind: DbErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::new(DbErrorKind::QueryFailed, msg)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(DbErrorKind::NotFound, what)
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for DbError {}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::new(DbErrorKind::NotFound, "Row not found"),
            other => Self::new(DbErrorKind::QueryFailed, other.to_string()),
        }
    }
}

// ── Query logging ───────────────────────────────────────────────────────

/// Optional fields attached to a query-log row.
#[derive(Debug, Clone, Default)]
pub struct QueryLog {
    pub response: Option<String>,
    pub tokens_used: Option<i64>,
    pub response_time_ms: Option<i64>,
    pub error: Option<String>,
    pub connection_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: i64,
    pub callsign: String,
    pub query: String,
    pub response: Option<String>,
    pub tokens_used: Option<i64>,
    pub response_time_ms: Option<i64>,
    pub error: Option<String>,
    pub timestamp: String,
}

// ── Rate limiting ───────────────────────────────────────────────────────

/// Used/limit/remaining counters for both rate windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateStatus {
    pub hourly_used: i64,
    pub hourly_limit: i64,
    pub hourly_remaining: i64,
    pub daily_used: i64,
    pub daily_limit: i64,
    pub daily_remaining: i64,
}

// ── Statistics ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConnectionStats {
    pub total_connections: i64,
    pub avg_duration_seconds: Option<f64>,
    pub total_packets_sent: i64,
    pub total_packets_received: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueryStats {
    pub total_queries: i64,
    pub successful_queries: i64,
    pub failed_queries: i64,
    pub avg_tokens: Option<f64>,
    pub avg_response_time_ms: Option<f64>,
}

// ── Mail ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub from_callsign: String,
    pub to_callsign: String,
    pub subject: String,
    pub body: String,
    pub is_read: bool,
    pub in_reply_to: Option<i64>,
    pub created_at: String,
    pub read_at: Option<String>,
    pub deleted_at: Option<String>,
}

// ── Files ───────────────────────────────────────────────────────────────

/// Access levels for stored files.
pub mod access {
    pub const PRIVATE: &str = "private";
    pub const PUBLIC: &str = "public";
    pub const SHARED: &str = "shared";

    pub fn is_valid(level: &str) -> bool {
        matches!(level, PRIVATE | PUBLIC | SHARED)
    }
}

/// Full file row including the blob.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: i64,
    pub filename: String,
    pub file_data: Vec<u8>,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub checksum: String,
    pub owner_callsign: String,
    pub access_level: String,
    pub description: Option<String>,
    pub uploaded_at: String,
    pub download_count: i64,
}

/// File metadata without the blob, for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub id: i64,
    pub filename: String,
    pub file_size: i64,
    pub mime_type: Option<String>,
    pub checksum: String,
    pub owner_callsign: String,
    pub access_level: String,
    pub description: Option<String>,
    pub uploaded_at: String,
    pub download_count: i64,
}

// ── Chat ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: i64,
    pub name: String,
    pub topic: Option<String>,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageRecord {
    pub id: i64,
    pub channel_id: i64,
    pub callsign: String,
    pub message: String,
    pub timestamp: String,
}
