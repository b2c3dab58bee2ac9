//! BBS mail: operator-to-operator messages with soft delete.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::store::{now_ts, Database};
use crate::db::types::{DbError, DbResult, MessageRecord};

fn row_to_message(row: &SqliteRow) -> MessageRecord {
    MessageRecord {
        id: row.try_get("id").unwrap_or(0),
        from_callsign: row.try_get("from_callsign").unwrap_or_default(),
        to_callsign: row.try_get("to_callsign").unwrap_or_default(),
        subject: row.try_get("subject").unwrap_or_default(),
        body: row.try_get("body").unwrap_or_default(),
        is_read: row.try_get::<i64, _>("is_read").unwrap_or(0) != 0,
        in_reply_to: row.try_get("in_reply_to").ok(),
        created_at: row.try_get("created_at").unwrap_or_default(),
        read_at: row.try_get("read_at").ok(),
        deleted_at: row.try_get("deleted_at").ok(),
    }
}

const MESSAGE_COLUMNS: &str = "id, from_callsign, to_callsign, subject, body, is_read, \
                               in_reply_to, created_at, read_at, deleted_at";

impl Database {
    pub async fn send_message(
        &self,
        from_callsign: &str,
        to_callsign: &str,
        subject: &str,
        body: &str,
        in_reply_to: Option<i64>,
    ) -> DbResult<i64> {
        let result = sqlx::query(
            "INSERT INTO messages (from_callsign, to_callsign, subject, body, in_reply_to, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(from_callsign.to_uppercase())
        .bind(to_callsign.to_uppercase())
        .bind(subject)
        .bind(body)
        .bind(in_reply_to)
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(result.last_insert_rowid())
    }

    /// Received messages, newest first. Soft-deleted rows are hidden.
    pub async fn get_messages(&self, callsign: &str, unread_only: bool) -> DbResult<Vec<MessageRecord>> {
        let sql = if unread_only {
            format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE to_callsign = ? AND deleted_at IS NULL AND is_read = 0
                 ORDER BY created_at DESC"
            )
        } else {
            format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE to_callsign = ? AND deleted_at IS NULL
                 ORDER BY created_at DESC"
            )
        };

        let rows = sqlx::query(&sql)
            .bind(callsign.to_uppercase())
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(rows.iter().map(row_to_message).collect())
    }

    /// Messages this callsign sent, newest first.
    pub async fn get_sent_messages(&self, callsign: &str) -> DbResult<Vec<MessageRecord>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE from_callsign = ? AND deleted_at IS NULL
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(callsign.to_uppercase())
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(rows.iter().map(row_to_message).collect())
    }

    /// One message, visible only to its sender or recipient.
    pub async fn get_message(&self, message_id: i64, callsign: &str) -> DbResult<Option<MessageRecord>> {
        let cs = callsign.to_uppercase();
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE id = ? AND (from_callsign = ? OR to_callsign = ?)"
        );
        let row = sqlx::query(&sql)
            .bind(message_id)
            .bind(&cs)
            .bind(&cs)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(row.as_ref().map(row_to_message))
    }

    /// Mark read; only the recipient can, and only once.
    pub async fn mark_message_read(&self, message_id: i64, callsign: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = 1, read_at = ?
             WHERE id = ? AND to_callsign = ? AND is_read = 0",
        )
        .bind(now_ts())
        .bind(message_id)
        .bind(callsign.to_uppercase())
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(result.rows_affected() > 0)
    }

    /// Soft delete; recipient only.
    pub async fn delete_message(&self, message_id: i64, callsign: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE messages SET deleted_at = ?
             WHERE id = ? AND to_callsign = ? AND deleted_at IS NULL",
        )
        .bind(now_ts())
        .bind(message_id)
        .bind(callsign.to_uppercase())
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn unread_count(&self, callsign: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages
             WHERE to_callsign = ? AND is_read = 0 AND deleted_at IS NULL",
        )
        .bind(callsign.to_uppercase())
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn send_and_list() {
        let db = db().await;
        let id = db.send_message("w2asm", "k0asm", "Hi", "Hello there", None).await.unwrap();
        assert!(id > 0);

        let inbox = db.get_messages("K0ASM", false).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].from_callsign, "W2ASM");
        assert!(!inbox[0].is_read);

        let sent = db.get_sent_messages("W2ASM").await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to_callsign, "K0ASM");
    }

    #[tokio::test]
    async fn visibility_is_sender_or_recipient_only() {
        let db = db().await;
        let id = db.send_message("W2ASM", "K0ASM", "s", "b", None).await.unwrap();
        assert!(db.get_message(id, "W2ASM").await.unwrap().is_some());
        assert!(db.get_message(id, "K0ASM").await.unwrap().is_some());
        assert!(db.get_message(id, "N0BDY").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_read_recipient_only_and_once() {
        let db = db().await;
        let id = db.send_message("W2ASM", "K0ASM", "s", "b", None).await.unwrap();

        assert!(!db.mark_message_read(id, "W2ASM").await.unwrap());
        assert!(db.mark_message_read(id, "K0ASM").await.unwrap());
        assert!(!db.mark_message_read(id, "K0ASM").await.unwrap());

        let msg = db.get_message(id, "K0ASM").await.unwrap().unwrap();
        assert!(msg.is_read);
        assert!(msg.read_at.is_some());
    }

    #[tokio::test]
    async fn soft_delete_hides_from_inbox() {
        let db = db().await;
        let id = db.send_message("W2ASM", "K0ASM", "s", "b", None).await.unwrap();

        assert!(!db.delete_message(id, "W2ASM").await.unwrap());
        assert!(db.delete_message(id, "K0ASM").await.unwrap());
        assert!(db.get_messages("K0ASM", false).await.unwrap().is_empty());
        // Direct fetch still shows the row (audit trail).
        assert!(db.get_message(id, "K0ASM").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unread_count_tracks_reads() {
        let db = db().await;
        db.send_message("W2ASM", "K0ASM", "1", "b", None).await.unwrap();
        let id2 = db.send_message("W1AW", "K0ASM", "2", "b", None).await.unwrap();
        assert_eq!(db.unread_count("K0ASM").await.unwrap(), 2);

        db.mark_message_read(id2, "K0ASM").await.unwrap();
        assert_eq!(db.unread_count("K0ASM").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reply_chain_recorded() {
        let db = db().await;
        let id = db.send_message("W2ASM", "K0ASM", "s", "b", None).await.unwrap();
        let reply = db.send_message("K0ASM", "W2ASM", "Re: s", "r", Some(id)).await.unwrap();
        let msg = db.get_message(reply, "W2ASM").await.unwrap().unwrap();
        assert_eq!(msg.in_reply_to, Some(id));
    }
}
