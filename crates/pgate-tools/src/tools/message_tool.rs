//! BBS mail tool: send, list, read, delete, reply.

use log::info;
use serde::Deserialize;

use pgate_agent::{ToolDefinition, ToolRegistry};
use pgate_core::normalize_callsign;
use pgate_db::{Database, MessageRecord};

/// Typed edge of the JSON tool input.
#[derive(Debug, Deserialize)]
struct MessageToolInput {
    action: String,
    callsign: String,
    #[serde(default)]
    message_id: Option<i64>,
    #[serde(default)]
    to_callsign: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    unread_only: bool,
    #[serde(default)]
    sent: bool,
}

/// First line of the body, clipped to 50 characters.
fn generate_subject(body: &str) -> String {
    let first_line = body.trim().lines().next().unwrap_or("");
    let mut subject: String = first_line.chars().take(50).collect();
    if first_line.chars().count() > 50 {
        subject.push_str("...");
    }
    if subject.is_empty() {
        "(no subject)".to_string()
    } else {
        subject
    }
}

fn short_date(timestamp: &str) -> String {
    // Stored form: "YYYY-MM-DD HH:MM:SS.ffffff"; show minute precision.
    timestamp.chars().take(16).collect()
}

fn listing_entry(msg: &MessageRecord, sent: bool) -> serde_json::Value {
    if sent {
        serde_json::json!({
            "id": msg.id,
            "status": if msg.is_read { "R" } else { " " },
            "to": msg.to_callsign,
            "subject": msg.subject,
            "date": short_date(&msg.created_at),
            "is_read": msg.is_read,
        })
    } else {
        serde_json::json!({
            "id": msg.id,
            "status": if msg.is_read { " " } else { "N" },
            "from": msg.from_callsign,
            "subject": msg.subject,
            "date": short_date(&msg.created_at),
            "is_read": msg.is_read,
        })
    }
}

async fn list_messages(db: &Database, input: &MessageToolInput) -> Result<String, String> {
    let callsign = &input.callsign;
    info!(
        "[mail] listing for {} (unread_only={}, sent={})",
        callsign, input.unread_only, input.sent
    );

    let (messages, unread) = if input.sent {
        (db.get_sent_messages(callsign).await.map_err(|e| e.to_string())?, 0)
    } else {
        (
            db.get_messages(callsign, input.unread_only).await.map_err(|e| e.to_string())?,
            db.unread_count(callsign).await.map_err(|e| e.to_string())?,
        )
    };

    let entries: Vec<serde_json::Value> =
        messages.iter().map(|m| listing_entry(m, input.sent)).collect();

    let mut result = serde_json::json!({
        "success": true,
        "total_count": entries.len(),
        "messages": entries,
    });
    if !input.sent {
        result["unread_count"] = unread.into();
        if entries.is_empty() {
            result["message"] = if input.unread_only {
                "No unread messages.".into()
            } else {
                "No messages.".into()
            };
        }
    } else if entries.is_empty() {
        result["message"] = "No sent messages.".into();
    }
    Ok(result.to_string())
}

async fn read_message(db: &Database, callsign: &str, message_id: i64) -> Result<String, String> {
    let Some(msg) = db.get_message(message_id, callsign).await.map_err(|e| e.to_string())? else {
        return Ok(serde_json::json!({
            "error": "Message not found",
            "message": format!("No message {} visible to {}", message_id, callsign),
        })
        .to_string());
    };

    // Reading marks it read when the reader is the recipient.
    if msg.to_callsign == callsign.to_uppercase() && !msg.is_read {
        db.mark_message_read(message_id, callsign).await.map_err(|e| e.to_string())?;
    }

    Ok(serde_json::json!({
        "success": true,
        "message": {
            "id": msg.id,
            "from": msg.from_callsign,
            "to": msg.to_callsign,
            "subject": msg.subject,
            "body": msg.body,
            "date": short_date(&msg.created_at),
            "in_reply_to": msg.in_reply_to,
        },
    })
    .to_string())
}

async fn send(
    db: &Database,
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
    in_reply_to: Option<i64>,
) -> Result<String, String> {
    let id = db
        .send_message(from, to, subject, body, in_reply_to)
        .await
        .map_err(|e| e.to_string())?;
    info!("[mail] {} -> {} (id {})", from, to, id);
    Ok(serde_json::json!({
        "success": true,
        "message_id": id,
        "message": format!("Message sent to {}", to),
    })
    .to_string())
}

/// Register the `messages` tool.
pub fn register_message_tool(registry: &mut ToolRegistry, db: Database) {
    let definition = ToolDefinition {
        name: "messages".to_string(),
        description: "Interact with the BBS message system. Users can send messages to other \
                      callsigns, list their received messages, list their sent messages, read \
                      specific messages, delete messages, and reply to messages. This is like \
                      email for packet radio operators. Use this when users ask about mail, \
                      messages, outbox, sent messages, or want to communicate with other users."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["list", "read", "send", "delete", "reply"],
                    "description": "The action to perform"
                },
                "callsign": {
                    "type": "string",
                    "description": "User's callsign (required for all actions)"
                },
                "message_id": {
                    "type": "integer",
                    "description": "Message ID (required for read, delete, reply actions)"
                },
                "to_callsign": {
                    "type": "string",
                    "description": "Recipient callsign (required for send action)"
                },
                "subject": {
                    "type": "string",
                    "description": "Message subject (optional for send action - will be generated from body if omitted)"
                },
                "body": {
                    "type": "string",
                    "description": "Message body (required for send and reply actions)"
                },
                "unread_only": {
                    "type": "boolean",
                    "description": "For list action: only show unread messages (default: false)"
                },
                "sent": {
                    "type": "boolean",
                    "description": "For list action: show sent messages instead of received (default: false)"
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
                let mut input: MessageToolInput =
                    serde_json::from_value(raw).map_err(|e| format!("Invalid input: {}", e))?;
                input.callsign = normalize_callsign(&input.callsign);
                if input.callsign.is_empty() {
                    return Err("Callsign is required".to_string());
                }

                match input.action.as_str() {
                    "list" => list_messages(&db, &input).await,
                    "read" => {
                        let id = input.message_id.ok_or("message_id required for read action")?;
                        read_message(&db, &input.callsign, id).await
                    }
                    "send" => {
                        let to = normalize_callsign(input.to_callsign.as_deref().unwrap_or(""));
                        let body = input.body.as_deref().unwrap_or("");
                        if to.is_empty() || body.is_empty() {
                            return Err("to_callsign and body required for send action".to_string());
                        }
                        let subject = match input.subject.as_deref() {
                            Some(s) if !s.is_empty() => s.to_string(),
                            _ => generate_subject(body),
                        };
                        send(&db, &input.callsign, &to, &subject, body, None).await
                    }
                    "delete" => {
                        let id = input.message_id.ok_or("message_id required for delete action")?;
                        let deleted =
                            db.delete_message(id, &input.callsign).await.map_err(|e| e.to_string())?;
                        Ok(serde_json::json!({
                            "success": deleted,
                            "message": if deleted {
                                format!("Message {} deleted", id)
                            } else {
                                format!("Message {} not found or not yours to delete", id)
                            },
                        })
                        .to_string())
                    }
                    "reply" => {
                        let id = input.message_id.ok_or("message_id required for reply action")?;
                        let body = input.body.as_deref().unwrap_or("");
                        if body.is_empty() {
                            return Err("message_id and body required for reply action".to_string());
                        }
                        let Some(original) =
                            db.get_message(id, &input.callsign).await.map_err(|e| e.to_string())?
                        else {
                            return Ok(serde_json::json!({
                                "error": "Message not found",
                                "message": format!("No message {} to reply to", id),
                            })
                            .to_string());
                        };
                        let to = if original.from_callsign == input.callsign {
                            original.to_callsign.clone()
                        } else {
                            original.from_callsign.clone()
                        };
                        let subject = if original.subject.starts_with("Re: ") {
                            original.subject.clone()
                        } else {
                            format!("Re: {}", original.subject)
                        };
                        send(&db, &input.callsign, &to, &subject, body, Some(id)).await
                    }
                    other => Err(format!("Unknown action: {}", other)),
                }
            })
        }),
    );
}
