//! Stored files: blobs, ownership, access control, shares.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::db::store::{now_ts, Database};
use crate::db::types::{access, DbError, DbResult, FileRecord, FileSummary};

fn row_to_summary(row: &SqliteRow) -> FileSummary {
    FileSummary {
        id: row.try_get("id").unwrap_or(0),
        filename: row.try_get("filename").unwrap_or_default(),
        file_size: row.try_get("file_size").unwrap_or(0),
        mime_type: row.try_get("mime_type").ok(),
        checksum: row.try_get("checksum").unwrap_or_default(),
        owner_callsign: row.try_get("owner_callsign").unwrap_or_default(),
        access_level: row.try_get("access_level").unwrap_or_default(),
        description: row.try_get("description").ok(),
        uploaded_at: row.try_get("uploaded_at").unwrap_or_default(),
        download_count: row.try_get("download_count").unwrap_or(0),
    }
}

impl Database {
    #[allow(clippy::too_many_arguments)]
    pub async fn save_file(
        &self,
        filename: &str,
        file_data: &[u8],
        mime_type: &str,
        checksum: &str,
        owner_callsign: &str,
        access_level: &str,
        description: Option<&str>,
    ) -> DbResult<i64> {
        let level = if access::is_valid(access_level) { access_level } else { access::PRIVATE };

        let result = sqlx::query(
            "INSERT INTO files
             (filename, file_data, file_size, mime_type, checksum, owner_callsign,
              access_level, description, uploaded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(filename)
        .bind(file_data)
        .bind(file_data.len() as i64)
        .bind(mime_type)
        .bind(checksum)
        .bind(owner_callsign.to_uppercase())
        .bind(level)
        .bind(description)
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_file(&self, file_id: i64) -> DbResult<Option<FileRecord>> {
        let row = sqlx::query(
            "SELECT id, filename, file_data, file_size, mime_type, checksum,
                    owner_callsign, access_level, description, uploaded_at, download_count
             FROM files WHERE id = ?",
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(row.map(|row| FileRecord {
            id: row.try_get("id").unwrap_or(0),
            filename: row.try_get("filename").unwrap_or_default(),
            file_data: row.try_get("file_data").unwrap_or_default(),
            file_size: row.try_get("file_size").unwrap_or(0),
            mime_type: row.try_get("mime_type").ok(),
            checksum: row.try_get("checksum").unwrap_or_default(),
            owner_callsign: row.try_get("owner_callsign").unwrap_or_default(),
            access_level: row.try_get("access_level").unwrap_or_default(),
            description: row.try_get("description").ok(),
            uploaded_at: row.try_get("uploaded_at").unwrap_or_default(),
            download_count: row.try_get("download_count").unwrap_or(0),
        }))
    }

    /// Files visible to `callsign`: own files, public files, and files shared
    /// with them. `access_filter` further narrows by level.
    pub async fn list_files(
        &self,
        callsign: Option<&str>,
        access_filter: Option<&str>,
    ) -> DbResult<Vec<FileSummary>> {
        let base = "SELECT id, filename, file_size, mime_type, checksum, owner_callsign,
                           access_level, description, uploaded_at, download_count
                    FROM files";

        let rows = match (callsign, access_filter) {
            (Some(cs), Some(filter)) => {
                let cs = cs.to_uppercase();
                sqlx::query(&format!(
                    "{base} WHERE (owner_callsign = ? OR access_level = 'public'
                        OR (access_level = 'shared' AND id IN
                            (SELECT file_id FROM file_shares WHERE shared_with_callsign = ?)))
                     AND access_level = ?
                     ORDER BY uploaded_at DESC"
                ))
                .bind(cs.clone())
                .bind(cs)
                .bind(filter)
                .fetch_all(&self.pool)
                .await
            }
            (Some(cs), None) => {
                let cs = cs.to_uppercase();
                sqlx::query(&format!(
                    "{base} WHERE owner_callsign = ? OR access_level = 'public'
                        OR (access_level = 'shared' AND id IN
                            (SELECT file_id FROM file_shares WHERE shared_with_callsign = ?))
                     ORDER BY uploaded_at DESC"
                ))
                .bind(cs.clone())
                .bind(cs)
                .fetch_all(&self.pool)
                .await
            }
            (None, _) => {
                sqlx::query(&format!(
                    "{base} WHERE access_level = 'public' ORDER BY uploaded_at DESC"
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(DbError::from)?;

        Ok(rows.iter().map(row_to_summary).collect())
    }

    /// Owner-only hard delete.
    pub async fn delete_file(&self, file_id: i64, callsign: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM files WHERE id = ? AND owner_callsign = ?")
            .bind(file_id)
            .bind(callsign.to_uppercase())
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(result.rows_affected() > 0)
    }

    /// Share a file with a callsign. Promotes the access level to `shared`
    /// and records the share row; the (file, callsign) pair is unique, so
    /// repeated shares are no-ops.
    pub async fn share_file(
        &self,
        file_id: i64,
        owner_callsign: &str,
        shared_with_callsign: &str,
    ) -> DbResult<bool> {
        let owner = owner_callsign.to_uppercase();

        let current: Option<String> = sqlx::query_scalar(
            "SELECT access_level FROM files WHERE id = ? AND owner_callsign = ?",
        )
        .bind(file_id)
        .bind(&owner)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        let Some(current) = current else {
            return Ok(false);
        };

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        if current != access::SHARED {
            sqlx::query("UPDATE files SET access_level = 'shared' WHERE id = ?")
                .bind(file_id)
                .execute(&mut *tx)
                .await
                .map_err(DbError::from)?;
        }

        sqlx::query(
            "INSERT OR IGNORE INTO file_shares
             (file_id, shared_with_callsign, shared_by_callsign, shared_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(file_id)
        .bind(shared_with_callsign.to_uppercase())
        .bind(&owner)
        .bind(now_ts())
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        tx.commit().await.map_err(DbError::from)?;
        Ok(true)
    }

    /// Owner-only promotion to public.
    pub async fn set_file_public(&self, file_id: i64, owner_callsign: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE files SET access_level = 'public' WHERE id = ? AND owner_callsign = ?",
        )
        .bind(file_id)
        .bind(owner_callsign.to_uppercase())
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(result.rows_affected() > 0)
    }

    /// `owner ∨ public ∨ (shared ∧ share row exists)`.
    pub async fn check_file_access(&self, file_id: i64, callsign: &str) -> DbResult<bool> {
        let cs = callsign.to_uppercase();

        let row = sqlx::query("SELECT owner_callsign, access_level FROM files WHERE id = ?")
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;

        let Some(row) = row else {
            return Ok(false);
        };

        let owner: String = row.try_get("owner_callsign").unwrap_or_default();
        let level: String = row.try_get("access_level").unwrap_or_default();

        if owner == cs || level == access::PUBLIC {
            return Ok(true);
        }
        if level != access::SHARED {
            return Ok(false);
        }

        let shared: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM file_shares WHERE file_id = ? AND shared_with_callsign = ?",
        )
        .bind(file_id)
        .bind(&cs)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(shared.is_some())
    }

    pub async fn increment_download_count(&self, file_id: i64) -> DbResult<()> {
        sqlx::query("UPDATE files SET download_count = download_count + 1 WHERE id = ?")
            .bind(file_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(())
    }

    pub async fn file_count(&self, callsign: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE owner_callsign = ?")
            .bind(callsign.to_uppercase())
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(count)
    }

    pub async fn total_file_size(&self, callsign: &str) -> DbResult<i64> {
        let total: Option<i64> =
            sqlx::query_scalar("SELECT SUM(file_size) FROM files WHERE owner_callsign = ?")
                .bind(callsign.to_uppercase())
                .fetch_one(&self.pool)
                .await
                .map_err(DbError::from)?;
        Ok(total.unwrap_or(0))
    }
}
