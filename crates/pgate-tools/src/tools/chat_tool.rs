//! Multi-user chat tool: channels, presence, history.

use log::info;
use serde::Deserialize;

use pgate_agent::{ToolDefinition, ToolRegistry};
use pgate_core::normalize_callsign;
use pgate_db::Database;

/// On join, replay this many recent messages from the last day.
const JOIN_REPLAY_COUNT: i64 = 4;
const JOIN_REPLAY_HOURS: i64 = 24;

#[derive(Debug, Deserialize)]
struct ChatToolInput {
    action: String,
    callsign: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    topic: Option<String>,
}

fn hhmm(timestamp: &str) -> String {
    // Stored form: "YYYY-MM-DD HH:MM:SS.ffffff".
    timestamp.get(11..16).unwrap_or(timestamp).to_string()
}

async fn join(db: &Database, callsign: &str, channel: &str) -> Result<String, String> {
    info!("[chat] {} joining {}", callsign, channel);

    let channel_id =
        db.get_or_create_channel(channel, callsign, None).await.map_err(|e| e.to_string())?;
    db.join_channel(channel_id, callsign).await.map_err(|e| e.to_string())?;

    let record = db.get_channel_by_name(channel).await.map_err(|e| e.to_string())?;
    let users = db.get_channel_users(channel_id).await.map_err(|e| e.to_string())?;
    let recent = db
        .get_recent_messages(channel_id, JOIN_REPLAY_COUNT, JOIN_REPLAY_HOURS)
        .await
        .map_err(|e| e.to_string())?;

    let replay: Vec<serde_json::Value> = recent
        .iter()
        .map(|m| {
            serde_json::json!({
                "callsign": m.callsign,
                "message": m.message,
                "time": hhmm(&m.timestamp),
            })
        })
        .collect();

    Ok(serde_json::json!({
        "success": true,
        "message": format!("Joined channel {}", channel.to_uppercase()),
        "channel": {
            "name": channel.to_uppercase(),
            "topic": record.and_then(|r| r.topic),
            "users_online": users.len(),
            "users": users,
        },
        "recent_messages": replay,
    })
    .to_string())
}

async fn send(db: &Database, callsign: &str, channel: &str, message: &str) -> Result<String, String> {
    let Some(record) = db.get_channel_by_name(channel).await.map_err(|e| e.to_string())? else {
        return Ok(serde_json::json!({
            "error": "Channel not found",
            "message": format!("Channel {} does not exist. Join it first.", channel.to_uppercase()),
        })
        .to_string());
    };

    let users = db.get_channel_users(record.id).await.map_err(|e| e.to_string())?;
    if !users.contains(&callsign.to_uppercase()) {
        return Ok(serde_json::json!({
            "error": "Not in channel",
            "message": format!("Join {} before sending to it.", channel.to_uppercase()),
        })
        .to_string());
    }

    db.post_chat_message(record.id, callsign, message).await.map_err(|e| e.to_string())?;
    Ok(serde_json::json!({
        "success": true,
        "message": format!("Message sent to {}", channel.to_uppercase()),
        "recipients": users.len().saturating_sub(1),
    })
    .to_string())
}

async fn who(db: &Database, channel: &str) -> Result<String, String> {
    let Some(record) = db.get_channel_by_name(channel).await.map_err(|e| e.to_string())? else {
        return Ok(serde_json::json!({
            "error": "Channel not found",
            "message": format!("Channel {} does not exist", channel.to_uppercase()),
        })
        .to_string());
    };
    let users = db.get_channel_users(record.id).await.map_err(|e| e.to_string())?;
    Ok(serde_json::json!({
        "success": true,
        "channel": record.name,
        "topic": record.topic,
        "users_online": users.len(),
        "users": users,
    })
    .to_string())
}

async fn recent(db: &Database, channel: &str) -> Result<String, String> {
    let Some(record) = db.get_channel_by_name(channel).await.map_err(|e| e.to_string())? else {
        return Ok(serde_json::json!({
            "error": "Channel not found",
            "message": format!("Channel {} does not exist", channel.to_uppercase()),
        })
        .to_string());
    };
    let messages =
        db.get_recent_messages(record.id, 20, JOIN_REPLAY_HOURS).await.map_err(|e| e.to_string())?;
    let entries: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "callsign": m.callsign,
                "message": m.message,
                "time": hhmm(&m.timestamp),
            })
        })
        .collect();
    Ok(serde_json::json!({
        "success": true,
        "channel": record.name,
        "count": entries.len(),
        "messages": entries,
    })
    .to_string())
}

async fn list_channels(db: &Database) -> Result<String, String> {
    let channels = db.list_channels().await.map_err(|e| e.to_string())?;
    let mut entries = Vec::new();
    for channel in &channels {
        let users = db.get_channel_users(channel.id).await.map_err(|e| e.to_string())?;
        entries.push(serde_json::json!({
            "name": channel.name,
            "topic": channel.topic,
            "users_online": users.len(),
        }));
    }
    Ok(serde_json::json!({ "success": true, "channels": entries }).to_string())
}

/// Register the `chat` tool.
pub fn register_chat_tool(registry: &mut ToolRegistry, db: Database) {
    let definition = ToolDefinition {
        name: "chat".to_string(),
        description: "Multi-user chat system for the BBS. Users can join channels, send \
                      messages, see who's online, list channels, and create new channels. Like \
                      CB Simulator or conference mode on classic BBSes. Use this when users want \
                      to chat, talk to others, join a channel, see who's online, or use commands \
                      like /C, /JOIN, /WHO, /CHAT."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["join", "leave", "send", "list_channels", "who", "recent", "topic"],
                    "description": "The action to perform"
                },
                "callsign": {
                    "type": "string",
                    "description": "User's callsign (required for all actions)"
                },
                "channel": {
                    "type": "string",
                    "description": "Channel name (required for join, send, who, recent, topic actions). Use 'MAIN' for the main public channel."
                },
                "message": {
                    "type": "string",
                    "description": "Message text (required for send action)"
                },
                "topic": {
                    "type": "string",
                    "description": "New channel topic (required for topic action)"
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
                let mut input: ChatToolInput =
                    serde_json::from_value(raw).map_err(|e| format!("Invalid input: {}", e))?;
                input.callsign = normalize_callsign(&input.callsign);
                if input.callsign.is_empty() {
                    return Err("Callsign is required".to_string());
                }
                let channel = input.channel.as_deref().map(str::to_uppercase);

                match input.action.as_str() {
                    "join" => {
                        let channel = channel.ok_or("channel required for join action")?;
                        join(&db, &input.callsign, &channel).await
                    }
                    "leave" => match channel {
                        Some(name) => {
                            let Some(record) =
                                db.get_channel_by_name(&name).await.map_err(|e| e.to_string())?
                            else {
                                return Ok(serde_json::json!({
                                    "error": "Channel not found",
                                    "message": format!("Channel {} does not exist", name),
                                })
                                .to_string());
                            };
                            db.leave_channel(record.id, &input.callsign)
                                .await
                                .map_err(|e| e.to_string())?;
                            Ok(serde_json::json!({
                                "success": true,
                                "message": format!("Left channel {}", name),
                            })
                            .to_string())
                        }
                        None => {
                            db.leave_all_channels(&input.callsign).await.map_err(|e| e.to_string())?;
                            Ok(serde_json::json!({
                                "success": true,
                                "message": "Left all channels",
                            })
                            .to_string())
                        }
                    },
                    "send" => {
                        let channel = channel.ok_or("channel and message required for send action")?;
                        let message = input.message.as_deref().unwrap_or("");
                        if message.is_empty() {
                            return Err("channel and message required for send action".to_string());
                        }
                        send(&db, &input.callsign, &channel, message).await
                    }
                    "list_channels" => list_channels(&db).await,
                    "who" => {
                        let channel = channel.ok_or("channel required for who action")?;
                        who(&db, &channel).await
                    }
                    "recent" => {
                        let channel = channel.ok_or("channel required for recent action")?;
                        recent(&db, &channel).await
                    }
                    "topic" => {
                        let channel = channel.ok_or("channel required for topic action")?;
                        let topic = input.topic.as_deref().unwrap_or("");
                        let updated =
                            db.set_channel_topic(&channel, topic).await.map_err(|e| e.to_string())?;
                        Ok(serde_json::json!({
                            "success": updated,
                            "message": if updated {
                                format!("Topic for {} updated", channel)
                            } else {
                                format!("Channel {} does not exist", channel)
                            },
                        })
                        .to_string())
                    }
                    other => Err(format!("Unknown action: {}", other)),
                }
            })
        }),
    );
}
