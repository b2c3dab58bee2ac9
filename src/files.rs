//! File transfer commands and YAPP completion plumbing.
//!
//! Telnet cannot carry binary, so downloads there render metadata plus a
//! short text preview; real transfers ride YAPP over AX.25. All quota and
//! filename validation happens before any YAPP exchange starts.

use log::{info, warn};

use pgate_core::filerules::{
    self, format_file_size, MAX_FILES_PER_USER, MAX_TOTAL_SIZE_PER_USER,
};
use pgate_db::{FileRecord, FileSummary};

use crate::gateway::{ConnRef, Gateway, Transport};

/// Bytes of a file shown in the telnet text preview.
const TELNET_PREVIEW_BYTES: usize = 500;

// ── Validation helpers ──────────────────────────────────────────────────

async fn check_quota(gateway: &Gateway, callsign: &str, file_size: usize) -> Result<(), String> {
    let max_size = gateway.config.file_transfer.max_size;
    if file_size > max_size {
        return Err(format!("File too large (max {} bytes)", max_size));
    }

    let count = gateway.db.file_count(callsign).await.map_err(|e| e.to_string())?;
    if count >= MAX_FILES_PER_USER {
        return Err(format!("Maximum file count reached ({} files)", MAX_FILES_PER_USER));
    }

    let total = gateway.db.total_file_size(callsign).await.map_err(|e| e.to_string())?;
    if total + file_size as i64 > MAX_TOTAL_SIZE_PER_USER {
        return Err(format!("Storage quota exceeded (max {} bytes)", MAX_TOTAL_SIZE_PER_USER));
    }

    Ok(())
}

/// Fetch a file for download: access check, integrity check, counter bump.
async fn download_file(
    gateway: &Gateway,
    file_id: i64,
    callsign: &str,
) -> Result<FileRecord, String> {
    if !gateway.db.check_file_access(file_id, callsign).await.map_err(|e| e.to_string())? {
        warn!("[files] access denied: {} on file {}", callsign, file_id);
        return Err("Access denied".to_string());
    }

    let Some(file) = gateway.db.get_file(file_id).await.map_err(|e| e.to_string())? else {
        return Err("File not found".to_string());
    };

    if filerules::md5_hex(&file.file_data) != file.checksum {
        warn!("[files] checksum mismatch for file {}", file_id);
        return Err("File integrity check failed".to_string());
    }

    gateway.db.increment_download_count(file_id).await.map_err(|e| e.to_string())?;
    info!("[files] {} downloaded file {} ({})", callsign, file_id, file.filename);
    Ok(file)
}

fn format_file_table(files: &[FileSummary]) -> String {
    if files.is_empty() {
        return "No files found.".to_string();
    }

    let mut lines = Vec::with_capacity(files.len() + 2);
    lines.push("ID  | Filename                     | Size    | Owner      | Access".to_string());
    lines.push("----|------------------------------|---------|------------|--------".to_string());
    for f in files {
        let filename: String = f.filename.chars().take(28).collect();
        let owner: String = f.owner_callsign.chars().take(10).collect();
        let access: String = f.access_level.chars().take(7).collect();
        lines.push(format!(
            "{:<4}| {:<28} | {:>7} | {:<10} | {}",
            f.id,
            filename,
            format_file_size(f.file_size),
            owner,
            access
        ));
    }
    lines.join("\n")
}

fn parse_file_id(arg: Option<&str>) -> Result<i64, String> {
    arg.ok_or("missing file id".to_string())?
        .parse::<i64>()
        .map_err(|_| "Invalid file ID. Must be a number.".to_string())
}

// ── Command handlers ────────────────────────────────────────────────────

/// `/files [public|private|shared|mine]`
pub async fn handle_files_command(gateway: &Gateway, conn: &ConnRef, line: &str) {
    let skey = gateway.session_key(conn);
    let filter = line
        .split_whitespace()
        .nth(1)
        .map(str::to_lowercase)
        .filter(|f| matches!(f.as_str(), "public" | "private" | "shared"));

    match gateway.db.list_files(Some(&skey), filter.as_deref()).await {
        Ok(files) if files.is_empty() => {
            gateway.send_to_station(conn, "No files found.\n> ").await;
        }
        Ok(files) => {
            let table = format_file_table(&files);
            gateway
                .send_to_station(
                    conn,
                    &format!("{}\n\nUse /download <file_id> to download a file.\n> ", table),
                )
                .await;
        }
        Err(e) => {
            gateway.send_to_station(conn, &format!("Error listing files: {}\n> ", e)).await;
        }
    }
}

/// `/download <id>`
pub async fn handle_download_command(gateway: &Gateway, conn: &ConnRef, line: &str) {
    let file_id = match parse_file_id(line.split_whitespace().nth(1)) {
        Ok(id) => id,
        Err(_) if line.split_whitespace().nth(1).is_none() => {
            gateway.send_to_station(conn, "Usage: /download <file_id>\n> ").await;
            return;
        }
        Err(e) => {
            gateway.send_to_station(conn, &format!("{}\n> ", e)).await;
            return;
        }
    };

    let skey = gateway.session_key(conn);
    let file = match download_file(gateway, file_id, &skey).await {
        Ok(file) => file,
        Err(e) => {
            gateway.send_to_station(conn, &format!("Error: {}\n> ", e)).await;
            return;
        }
    };

    match conn.transport {
        Transport::Telnet => {
            // No in-band binary over telnet: metadata plus a text preview.
            let preview_len = file.file_data.len().min(TELNET_PREVIEW_BYTES);
            let preview = String::from_utf8_lossy(&file.file_data[..preview_len]);
            let divider = "=".repeat(50);
            gateway
                .send_to_station(
                    conn,
                    &format!(
                        "File: {}\nSize: {}\nNote: YAPP file transfer is only supported over AX.25.\n\
                         File contents (text preview):\n{}\n{}\n{}\n> ",
                        file.filename,
                        format_file_size(file.file_size),
                        divider,
                        preview,
                        divider
                    ),
                )
                .await;
        }
        Transport::Ax25 => {
            gateway
                .send_to_station(conn, &format!("Starting download of {}...\n", file.filename))
                .await;
            let Some(link) = &gateway.link else {
                return;
            };
            let mtime = chrono::Utc::now().timestamp();
            let result = link
                .lock()
                .await
                .start_yapp_download(&conn.key, &file.filename, file.file_data, mtime)
                .await;
            if let Err(e) = result {
                warn!("[files] download start failed: {}", e);
                gateway.send_to_station(conn, "Failed to start download.\n> ").await;
            }
        }
    }
}

/// `/fileinfo <id>`
pub async fn handle_fileinfo_command(gateway: &Gateway, conn: &ConnRef, line: &str) {
    let file_id = match parse_file_id(line.split_whitespace().nth(1)) {
        Ok(id) => id,
        Err(_) if line.split_whitespace().nth(1).is_none() => {
            gateway.send_to_station(conn, "Usage: /fileinfo <file_id>\n> ").await;
            return;
        }
        Err(e) => {
            gateway.send_to_station(conn, &format!("{}\n> ", e)).await;
            return;
        }
    };

    let skey = gateway.session_key(conn);
    let accessible = gateway.db.check_file_access(file_id, &skey).await.unwrap_or(false);
    if !accessible {
        gateway.send_to_station(conn, "Error: Access denied\n> ").await;
        return;
    }

    match gateway.db.get_file(file_id).await {
        Ok(Some(file)) => {
            let info = format!(
                "\nFile Information:\n  ID: {}\n  Filename: {}\n  Size: {}\n  Owner: {}\n  \
                 Access: {}\n  Uploaded: {}\n  Downloads: {}\n  Description: {}\n",
                file.id,
                file.filename,
                format_file_size(file.file_size),
                file.owner_callsign,
                file.access_level,
                file.uploaded_at,
                file.download_count,
                file.description.as_deref().unwrap_or("None"),
            );
            gateway.send_to_station(conn, &format!("{}> ", info)).await;
        }
        Ok(None) => {
            gateway.send_to_station(conn, "Error: File not found\n> ").await;
        }
        Err(e) => {
            gateway.send_to_station(conn, &format!("Error: {}\n> ", e)).await;
        }
    }
}

/// `/share <id> <callsign>`
pub async fn handle_share_command(gateway: &Gateway, conn: &ConnRef, line: &str) {
    let mut parts = line.split_whitespace().skip(1);
    let (id_arg, callsign_arg) = (parts.next(), parts.next());
    let (Some(id_arg), Some(callsign_arg)) = (id_arg, callsign_arg) else {
        gateway.send_to_station(conn, "Usage: /share <file_id> <callsign>\n> ").await;
        return;
    };

    let file_id = match id_arg.parse::<i64>() {
        Ok(id) => id,
        Err(_) => {
            gateway.send_to_station(conn, "Invalid file ID. Must be a number.\n> ").await;
            return;
        }
    };

    let shared_with = callsign_arg.to_uppercase();
    if !pgate_core::is_valid_callsign(&shared_with) {
        gateway.send_to_station(conn, "Error: Invalid callsign\n> ").await;
        return;
    }

    let skey = gateway.session_key(conn);
    match gateway.db.share_file(file_id, &skey, &shared_with).await {
        Ok(true) => {
            gateway
                .send_to_station(conn, &format!("File shared with {}.\n> ", shared_with))
                .await;
        }
        Ok(false) => {
            gateway
                .send_to_station(conn, "Error: Share failed (not owner or file not found)\n> ")
                .await;
        }
        Err(e) => {
            gateway.send_to_station(conn, &format!("Error: {}\n> ", e)).await;
        }
    }
}

/// `/publicfile <id>`
pub async fn handle_publicfile_command(gateway: &Gateway, conn: &ConnRef, line: &str) {
    let file_id = match parse_file_id(line.split_whitespace().nth(1)) {
        Ok(id) => id,
        Err(_) if line.split_whitespace().nth(1).is_none() => {
            gateway.send_to_station(conn, "Usage: /publicfile <file_id>\n> ").await;
            return;
        }
        Err(e) => {
            gateway.send_to_station(conn, &format!("{}\n> ", e)).await;
            return;
        }
    };

    let skey = gateway.session_key(conn);
    match gateway.db.set_file_public(file_id, &skey).await {
        Ok(true) => {
            gateway.send_to_station(conn, &format!("File {} is now public.\n> ", file_id)).await;
        }
        Ok(false) => {
            gateway.send_to_station(conn, "Error: Not file owner\n> ").await;
        }
        Err(e) => {
            gateway.send_to_station(conn, &format!("Error: {}\n> ", e)).await;
        }
    }
}

/// `/deletefile <id>`
pub async fn handle_deletefile_command(gateway: &Gateway, conn: &ConnRef, line: &str) {
    let file_id = match parse_file_id(line.split_whitespace().nth(1)) {
        Ok(id) => id,
        Err(_) if line.split_whitespace().nth(1).is_none() => {
            gateway.send_to_station(conn, "Usage: /deletefile <file_id>\n> ").await;
            return;
        }
        Err(e) => {
            gateway.send_to_station(conn, &format!("{}\n> ", e)).await;
            return;
        }
    };

    let skey = gateway.session_key(conn);
    match gateway.db.delete_file(file_id, &skey).await {
        Ok(true) => {
            gateway.send_to_station(conn, &format!("File {} deleted.\n> ", file_id)).await;
        }
        Ok(false) => {
            gateway
                .send_to_station(conn, "Error: Delete failed (not owner or file not found)\n> ")
                .await;
        }
        Err(e) => {
            gateway.send_to_station(conn, &format!("Error: {}\n> ", e)).await;
        }
    }
}

/// `/upload`
pub async fn handle_upload_command(gateway: &Gateway, conn: &ConnRef, _line: &str) {
    if conn.transport == Transport::Telnet {
        gateway
            .send_to_station(
                conn,
                "YAPP file upload is only supported over AX.25 connections.\n\
                 Please use an AX.25 packet client to upload files.\n> ",
            )
            .await;
        return;
    }

    // Quota gate before any YAPP bytes move.
    let skey = gateway.session_key(conn);
    if let Err(e) = check_quota(gateway, &skey, 0).await {
        gateway.send_to_station(conn, &format!("Error: {}\n> ", e)).await;
        return;
    }

    gateway
        .send_to_station(conn, "Ready to receive file via YAPP. Send ENQ to start.\n")
        .await;

    let Some(link) = &gateway.link else {
        return;
    };
    if let Err(e) = link.lock().await.start_yapp_upload(&conn.key).await {
        warn!("[files] upload start failed: {}", e);
        gateway.send_to_station(conn, "Failed to start upload.\n> ").await;
    }
}

// ── YAPP completion ─────────────────────────────────────────────────────

/// A YAPP upload finished: validate and persist the blob.
pub async fn on_upload_complete(gateway: &Gateway, conn: &ConnRef, filename: &str, data: Vec<u8>) {
    let skey = gateway.session_key(conn);

    let filename = filerules::sanitize_filename(filename);
    if let Err(e) = filerules::validate_filename(&filename) {
        warn!("[files] invalid filename from {}: {}", skey, e);
        gateway.send_to_station(conn, &format!("\nUpload failed: {}\n> ", e)).await;
        return;
    }
    if let Err(e) = check_quota(gateway, &skey, data.len()).await {
        warn!("[files] quota exceeded for {}: {}", skey, e);
        gateway.send_to_station(conn, &format!("\nUpload failed: {}\n> ", e)).await;
        return;
    }

    let checksum = filerules::md5_hex(&data);
    let mime = filerules::guess_mime_type(&filename);

    match gateway
        .db
        .save_file(&filename, &data, mime, &checksum, &skey, "private", None)
        .await
    {
        Ok(file_id) => {
            info!("[files] {} uploaded {} ({} bytes, id {})", skey, filename, data.len(), file_id);
            gateway.activity.add(&skey, "upload", &filename);
            gateway
                .send_to_station(
                    conn,
                    &format!(
                        "\nFile uploaded successfully!\nFile ID: {}\nFilename: {}\nSize: {}\n\
                         Use /publicfile {} to make it public.\n\
                         Use /share {} <callsign> to share it.\n> ",
                        file_id,
                        filename,
                        format_file_size(data.len() as i64),
                        file_id,
                        file_id
                    ),
                )
                .await;
        }
        Err(e) => {
            gateway.send_to_station(conn, &format!("\nUpload failed: {}\n> ", e)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgate_db::FileSummary;

    fn summary(id: i64, filename: &str, size: i64) -> FileSummary {
        FileSummary {
            id,
            filename: filename.to_string(),
            file_size: size,
            mime_type: None,
            checksum: "x".into(),
            owner_callsign: "K0ASM".into(),
            access_level: "private".into(),
            description: None,
            uploaded_at: "2026-08-01 00:00:00.000000".into(),
            download_count: 0,
        }
    }

    #[test]
    fn table_formats_columns() {
        let table = format_file_table(&[summary(1, "test.txt", 512), summary(12, "big.bin", 2048)]);
        assert!(table.contains("ID  | Filename"));
        assert!(table.contains("test.txt"));
        assert!(table.contains("512 B"));
        assert!(table.contains("2.0 KB"));
    }

    #[test]
    fn table_empty() {
        assert_eq!(format_file_table(&[]), "No files found.");
    }

    #[test]
    fn file_id_parsing() {
        assert_eq!(parse_file_id(Some("42")).unwrap(), 42);
        assert!(parse_file_id(Some("abc")).is_err());
        assert!(parse_file_id(None).is_err());
    }
}
