//! BbsControl capability: the narrow surface the bbs_session tool sees.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use pgate_ax25::LinkManager;
use pgate_db::Database;
use pgate_session::SessionStore;
use pgate_telnet::TelnetServer;
use pgate_tools::BbsControl;

use crate::activity::ActivityFeed;

/// Bundles just the pieces the control tool is allowed to touch.
pub struct GatewayControl {
    sessions: SessionStore,
    db: Database,
    activity: ActivityFeed,
    telnet: Option<Arc<TelnetServer>>,
    link: Option<Arc<Mutex<LinkManager>>>,
    started_at: DateTime<Utc>,
}

impl GatewayControl {
    pub fn new(
        sessions: SessionStore,
        db: Database,
        activity: ActivityFeed,
        telnet: Option<Arc<TelnetServer>>,
        link: Option<Arc<Mutex<LinkManager>>>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self { sessions, db, activity, telnet, link, started_at }
    }

    async fn connected_users(&self) -> Vec<serde_json::Value> {
        let mut users = Vec::new();

        if let Some(telnet) = &self.telnet {
            for info in telnet.list_connections().await {
                users.push(serde_json::json!({
                    "connection": info.key,
                    "transport": "telnet",
                    "callsign": info.callsign,
                    "connected_at": info.connected_at,
                }));
            }
        }

        if let Some(link) = &self.link {
            let link = link.lock().await;
            for key in link.connection_keys() {
                if let Some(conn) = link.connection(&key) {
                    users.push(serde_json::json!({
                        "connection": key,
                        "transport": "ax25",
                        "callsign": conn.remote_address(),
                        "connected_at": conn.connected_at.map(|t| t.to_rfc3339()),
                    }));
                }
            }
        }

        users
    }
}

#[async_trait]
impl BbsControl for GatewayControl {
    async fn session_info(&self, connection_id: &str) -> serde_json::Value {
        match self.sessions.snapshot(connection_id).await {
            Some(snapshot) => serde_json::json!({
                "success": true,
                "session": {
                    "callsign": snapshot.callsign,
                    "messages": snapshot.messages,
                    "queries": snapshot.queries,
                    "authenticated": snapshot.authenticated,
                    "created_at": snapshot.created_at,
                    "idle_seconds": snapshot.idle_seconds,
                    "operator": snapshot.operator_name,
                },
            }),
            None => serde_json::json!({
                "success": false,
                "error": format!("No session for {}", connection_id),
            }),
        }
    }

    async fn list_users(&self) -> serde_json::Value {
        let users = self.connected_users().await;
        serde_json::json!({
            "success": true,
            "count": users.len(),
            "users": users,
            "recently_active": self.activity.active_users(10),
        })
    }

    async fn system_status(&self) -> serde_json::Value {
        let session_stats = self.sessions.stats().await;
        let query_stats = self.db.query_stats(None).await.unwrap_or_default();
        let uptime = (Utc::now() - self.started_at).num_seconds();

        serde_json::json!({
            "success": true,
            "uptime_seconds": uptime,
            "active_sessions": session_stats.active_sessions,
            "total_context_messages": session_stats.total_messages,
            "session_queries": session_stats.total_queries,
            "queries_logged": query_stats.total_queries,
            "queries_failed": query_stats.failed_queries,
            "telnet_enabled": self.telnet.is_some(),
            "ax25_enabled": self.link.is_some(),
        })
    }

    async fn clear_history(&self, connection_id: &str) -> serde_json::Value {
        self.sessions.clear(connection_id).await;
        serde_json::json!({
            "success": true,
            "message": format!("Conversation history cleared for {}", connection_id),
        })
    }

    async fn disconnect(&self, connection_id: &str) -> serde_json::Value {
        if let Some(telnet) = &self.telnet {
            if telnet.contains(connection_id).await {
                telnet.disconnect(connection_id).await;
                return serde_json::json!({
                    "success": true,
                    "message": format!("Disconnecting {}", connection_id),
                });
            }
        }
        if let Some(link) = &self.link {
            let mut link = link.lock().await;
            if link.connection(connection_id).is_some() {
                link.disconnect(connection_id).await;
                return serde_json::json!({
                    "success": true,
                    "message": format!("Disconnecting {}", connection_id),
                });
            }
        }
        serde_json::json!({
            "success": false,
            "error": format!("Connection not found: {}", connection_id),
        })
    }
}
