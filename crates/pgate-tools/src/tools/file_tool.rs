//! File management tool: listings and metadata for the model to relay.
//!
//! Actual byte transfer happens over YAPP at the link layer; this tool only
//! answers questions about what is stored.

use serde::Deserialize;

use pgate_agent::{ToolDefinition, ToolRegistry};
use pgate_core::filerules::format_file_size;
use pgate_core::normalize_callsign;
use pgate_db::Database;

#[derive(Debug, Deserialize)]
struct FileToolInput {
    action: String,
    callsign: String,
    #[serde(default)]
    file_id: Option<i64>,
    #[serde(default)]
    filter: Option<String>,
}

fn help_text() -> serde_json::Value {
    serde_json::json!({
        "success": true,
        "help": {
            "commands": {
                "/files [public|private|shared]": "List files you can access",
                "/download <id>": "Download a file (YAPP over AX.25; text preview on telnet)",
                "/upload": "Upload a file via YAPP (AX.25 only)",
                "/fileinfo <id>": "Show file details",
                "/share <id> <callsign>": "Share one of your files with another operator",
                "/publicfile <id>": "Make one of your files public",
                "/deletefile <id>": "Delete one of your files",
            },
            "limits": {
                "max_file_size": "100 KB",
                "max_files_per_user": 50,
                "max_total_per_user": "5 MB",
            },
        },
    })
}

async fn list_files(
    db: &Database,
    callsign: &str,
    filter: Option<&str>,
) -> Result<String, String> {
    let filter = filter.filter(|f| *f != "all");
    let files = db.list_files(Some(callsign), filter).await.map_err(|e| e.to_string())?;

    let entries: Vec<serde_json::Value> = files
        .iter()
        .map(|f| {
            serde_json::json!({
                "id": f.id,
                "filename": f.filename,
                "size": format_file_size(f.file_size),
                "owner": f.owner_callsign,
                "access": f.access_level,
                "downloads": f.download_count,
                "description": f.description,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "success": true,
        "count": entries.len(),
        "files": entries,
        "hint": "Use /download <id> to retrieve a file",
    })
    .to_string())
}

async fn file_info(db: &Database, callsign: &str, file_id: i64) -> Result<String, String> {
    if !db.check_file_access(file_id, callsign).await.map_err(|e| e.to_string())? {
        return Ok(serde_json::json!({
            "error": "Access denied",
            "message": format!("File {} is not accessible to {}", file_id, callsign),
        })
        .to_string());
    }

    let Some(file) = db.get_file(file_id).await.map_err(|e| e.to_string())? else {
        return Ok(serde_json::json!({
            "error": "File not found",
            "message": format!("No file with id {}", file_id),
        })
        .to_string());
    };

    Ok(serde_json::json!({
        "success": true,
        "file": {
            "id": file.id,
            "filename": file.filename,
            "size": format_file_size(file.file_size),
            "size_bytes": file.file_size,
            "mime_type": file.mime_type,
            "checksum": file.checksum,
            "owner": file.owner_callsign,
            "access": file.access_level,
            "description": file.description,
            "uploaded_at": file.uploaded_at,
            "downloads": file.download_count,
        },
    })
    .to_string())
}

/// Register the `file_management` tool.
pub fn register_file_tool(registry: &mut ToolRegistry, db: Database) {
    let definition = ToolDefinition {
        name: "file_management".to_string(),
        description: "Manage files stored on the BBS. List available files, get file \
                      information, and help users with file operations. Files are transferred \
                      via YAPP protocol over AX.25. Use this when users ask about files, file \
                      transfers, uploads, or downloads."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["list", "info", "help"],
                    "description": "Action to perform: 'list' files accessible to the user, 'info' about a specific file, 'help' about file operations"
                },
                "file_id": {
                    "type": "integer",
                    "description": "File ID (required for 'info' action)"
                },
                "filter": {
                    "type": "string",
                    "enum": ["public", "private", "shared", "all"],
                    "description": "Filter files by access level (for 'list' action)"
                },
                "callsign": {
                    "type": "string",
                    "description": "User's callsign (extracted from connection context)"
                }
            },
            "required": ["action", "callsign"]
        }),
    };

    registry.register(
        definition,
        Box::new(move |raw| {
            let db = db.clone();
            Box::pin(async move {
                let mut input: FileToolInput =
                    serde_json::from_value(raw).map_err(|e| format!("Invalid input: {}", e))?;
                input.callsign = normalize_callsign(&input.callsign);
                if input.callsign.is_empty() {
                    return Err("Callsign is required".to_string());
                }

                match input.action.as_str() {
                    "list" => list_files(&db, &input.callsign, input.filter.as_deref()).await,
                    "info" => {
                        let id = input.file_id.ok_or("file_id is required for 'info' action")?;
                        file_info(&db, &input.callsign, id).await
                    }
                    "help" => Ok(help_text().to_string()),
                    other => Err(format!("Unknown action: {}", other)),
                }
            })
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgate_agent::ToolRegistry;

    async fn setup() -> (ToolRegistry, Database) {
        let db = Database::open_in_memory().await.unwrap();
        let mut registry = ToolRegistry::new();
        register_file_tool(&mut registry, db.clone());
        (registry, db)
    }

    #[tokio::test]
    async fn list_shows_accessible_files() {
        let (registry, db) = setup().await;
        db.save_file("mine.txt", b"abc", "text/plain", "c1", "K0ASM", "private", None)
            .await
            .unwrap();
        db.save_file("other.txt", b"def", "text/plain", "c2", "W1AW", "private", None)
            .await
            .unwrap();

        let out = registry
            .invoke("file_management", serde_json::json!({ "action": "list", "callsign": "K0ASM" }))
            .await;
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["count"], 1);
        assert_eq!(parsed["files"][0]["filename"], "mine.txt");
    }

    #[tokio::test]
    async fn info_enforces_access() {
        let (registry, db) = setup().await;
        let id = db
            .save_file("secret.txt", b"abc", "text/plain", "c1", "W1AW", "private", None)
            .await
            .unwrap();

        let out = registry
            .invoke(
                "file_management",
                serde_json::json!({ "action": "info", "callsign": "K0ASM", "file_id": id }),
            )
            .await;
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["error"], "Access denied");
    }

    #[tokio::test]
    async fn info_returns_metadata() {
        let (registry, db) = setup().await;
        let id = db
            .save_file("notes.txt", b"hello", "text/plain", "c1", "K0ASM", "private", Some("Field notes"))
            .await
            .unwrap();

        let out = registry
            .invoke(
                "file_management",
                serde_json::json!({ "action": "info", "callsign": "K0ASM", "file_id": id }),
            )
            .await;
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["file"]["filename"], "notes.txt");
        assert_eq!(parsed["file"]["size_bytes"], 5);
        assert_eq!(parsed["file"]["description"], "Field notes");
    }

    #[tokio::test]
    async fn help_lists_commands() {
        let (registry, _db) = setup().await;
        let out = registry
            .invoke("file_management", serde_json::json!({ "action": "help", "callsign": "K0ASM" }))
            .await;
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(parsed["help"]["commands"]["/upload"].as_str().is_some());
    }
}
