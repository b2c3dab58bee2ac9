//! Filename rules, quotas, and checksums for stored files.

use lazy_static::lazy_static;
use md5::{Digest, Md5};
use regex::Regex;

/// Per-file size cap (bytes) unless overridden by configuration.
pub const MAX_FILE_SIZE: usize = 100 * 1024;
/// Files per owner.
pub const MAX_FILES_PER_USER: i64 = 50;
/// Total stored bytes per owner.
pub const MAX_TOTAL_SIZE_PER_USER: i64 = 5 * 1024 * 1024;
/// Filename length cap.
pub const MAX_FILENAME_LEN: usize = 128;

lazy_static! {
    static ref FILENAME_RE: Regex = Regex::new(r"^[a-zA-Z0-9._-]+$").unwrap();
}

/// Validate a filename against the stored-file rules.
pub fn validate_filename(filename: &str) -> Result<(), String> {
    if filename.is_empty() {
        return Err("Filename cannot be empty".to_string());
    }
    if filename.len() > MAX_FILENAME_LEN {
        return Err(format!("Filename too long (max {} characters)", MAX_FILENAME_LEN));
    }
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return Err("Filename cannot contain path separators".to_string());
    }
    if !FILENAME_RE.is_match(filename) {
        return Err(
            "Filename contains invalid characters (use only a-z, A-Z, 0-9, ., _, -)".to_string()
        );
    }
    Ok(())
}

/// Force a peer-supplied name into the allowed shape: strip any path, map
/// invalid characters to `_`, clamp the length keeping the extension.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let mut cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();

    if cleaned.len() > MAX_FILENAME_LEN {
        let ext = cleaned.rfind('.').map(|i| cleaned[i..].to_string()).unwrap_or_default();
        let keep = MAX_FILENAME_LEN.saturating_sub(ext.len());
        cleaned = format!("{}{}", &cleaned[..keep], ext);
    }

    cleaned
}

/// MD5 digest as lower-case hex.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Guess a MIME type from the filename extension.
pub fn guess_mime_type(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "txt" | "log" | "md" => "text/plain",
        "htm" | "html" => "text/html",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// Human-readable size.
pub fn format_file_size(size_bytes: i64) -> String {
    if size_bytes < 1024 {
        format!("{} B", size_bytes)
    } else if size_bytes < 1024 * 1024 {
        format!("{:.1} KB", size_bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", size_bytes as f64 / (1024.0 * 1024.0))
    }
}
