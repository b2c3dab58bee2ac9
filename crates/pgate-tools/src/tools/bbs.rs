//! BBS control tool.
//!
//! The tool is handed a narrow capability trait rather than the application
//! itself: it can inspect sessions, list users, report status, clear a
//! conversation, and request a disconnect. Each method returns a JSON value
//! ready to hand to the model.

use std::sync::Arc;

use async_trait::async_trait;

use pgate_agent::{ToolDefinition, ToolRegistry};

/// What the BBS exposes to the control tool.
#[async_trait]
pub trait BbsControl: Send + Sync {
    /// Session details for one connection identity (callsign or ip:port).
    async fn session_info(&self, connection_id: &str) -> serde_json::Value;
    /// Everyone currently connected, across both transports.
    async fn list_users(&self) -> serde_json::Value;
    /// System status: uptime, transports, session/query counters.
    async fn system_status(&self) -> serde_json::Value;
    /// Wipe a session's conversation history.
    async fn clear_history(&self, connection_id: &str) -> serde_json::Value;
    /// Ask the gateway to disconnect a connection.
    async fn disconnect(&self, connection_id: &str) -> serde_json::Value;
}

/// Register the `bbs_session` tool over a [`BbsControl`] capability.
pub fn register_bbs_tool(registry: &mut ToolRegistry, control: Arc<dyn BbsControl>) {
    let definition = ToolDefinition {
        name: "bbs_session".to_string(),
        description: "Interact with the BBS system. Use this tool to get information about the \
                      current user's session, show the list of connected users, get system \
                      status and statistics, clear conversation history, or disconnect users."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["get_session_info", "list_users", "get_status", "clear_history", "disconnect"],
                    "description": "The action to perform"
                },
                "connection_id": {
                    "type": "string",
                    "description": "Connection identifier (callsign or IP:port) - required for session and disconnect actions"
                }
            },
            "required": ["action"]
        }),
    };

    registry.register(
        definition,
        Box::new(move |input| {
            let control = control.clone();
            Box::pin(async move {
                let action = input["action"].as_str().unwrap_or("");
                let connection_id = input["connection_id"].as_str().unwrap_or("");

                let needs_connection =
                    matches!(action, "get_session_info" | "clear_history" | "disconnect");
                if needs_connection && connection_id.is_empty() {
                    return Err("connection_id is required".to_string());
                }

                let result = match action {
                    "get_session_info" => control.session_info(connection_id).await,
                    "list_users" => control.list_users().await,
                    "get_status" => control.system_status().await,
                    "clear_history" => control.clear_history(connection_id).await,
                    "disconnect" => control.disconnect(connection_id).await,
                    other => serde_json::json!({
                        "success": false,
                        "error": format!("Unknown action: {}", other),
                    }),
                };
                Ok(result.to_string())
            })
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgate_agent::ToolRegistry;

    struct FakeControl;

    #[async_trait]
    impl BbsControl for FakeControl {
        async fn session_info(&self, connection_id: &str) -> serde_json::Value {
            serde_json::json!({ "success": true, "session": { "callsign": connection_id } })
        }
        async fn list_users(&self) -> serde_json::Value {
            serde_json::json!({ "success": true, "users": ["K0ASM", "W1AW"] })
        }
        async fn system_status(&self) -> serde_json::Value {
            serde_json::json!({ "success": true, "active_sessions": 2 })
        }
        async fn clear_history(&self, _connection_id: &str) -> serde_json::Value {
            serde_json::json!({ "success": true })
        }
        async fn disconnect(&self, connection_id: &str) -> serde_json::Value {
            serde_json::json!({ "success": true, "disconnected": connection_id })
        }
    }

    fn setup() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        register_bbs_tool(&mut registry, Arc::new(FakeControl));
        registry
    }

    #[tokio::test]
    async fn session_info_routes_through_capability() {
        let registry = setup();
        let out = registry
            .invoke(
                "bbs_session",
                serde_json::json!({ "action": "get_session_info", "connection_id": "K0ASM" }),
            )
            .await;
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["session"]["callsign"], "K0ASM");
    }

    #[tokio::test]
    async fn list_users_needs_no_connection() {
        let registry = setup();
        let out = registry
            .invoke("bbs_session", serde_json::json!({ "action": "list_users" }))
            .await;
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["users"][0], "K0ASM");
    }

    #[tokio::test]
    async fn missing_connection_id_is_an_error() {
        let registry = setup();
        let out = registry
            .invoke("bbs_session", serde_json::json!({ "action": "disconnect" }))
            .await;
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("connection_id"));
    }

    #[tokio::test]
    async fn unknown_action_reported() {
        let registry = setup();
        let out = registry
            .invoke("bbs_session", serde_json::json!({ "action": "reboot" }))
            .await;
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["success"], false);
    }
}
