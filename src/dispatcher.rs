//! The per-line dispatcher: commands, rate gate, LLM turn, reply delivery.
//!
//! Everything a line can do funnels through [`handle_line`], whose body is a
//! recovery boundary: a failure inside one turn is logged and answered with
//! a retry hint, and never takes down the connection or the process.

use std::time::Instant;

use log::{error, info};

use pgate_agent::ChatTurn;
use pgate_db::QueryLog;
use pgate_session::{ChatRole, RateLimiter};

use crate::gateway::{ConnRef, Gateway};
use crate::{auth, files};

const EXIT_COMMANDS: &[&str] =
    &["quit", "bye", "exit", "73", "/exit", "close", "logout", "disconnect"];

const HELP_TEXT: &str = r#"
packetgate Help:
- Simply type your questions to chat with the AI assistant
- 'help' or '?' - Show this help
- 'status' - Show rate limit status
- 'clear' - Clear conversation history
- Exit: 'quit', 'bye', 'exit', '73', '/exit', 'close', or Ctrl-C

Commands:
- Check mail, send messages, list sent messages
- Look up callsigns, get POTA spots, DX cluster spots, search the web
- Try: "dx cw 20m", "cluster 17m ssb", "pota spots"

File Transfer (via YAPP over AX.25):
- /upload - Start file upload
- /files [public|private|shared] - List files
- /download <id> - Download file by ID
- /fileinfo <id> - Show file information
- /share <id> <callsign> - Share file with callsign
- /publicfile <id> - Make file public
- /deletefile <id> - Delete file

Your conversation context is preserved during the session.
"#;

/// Entry point for every inbound line.
pub async fn handle_line(gateway: &Gateway, conn: &ConnRef, raw: &str) {
    let line = raw.trim();
    if line.is_empty() {
        return;
    }

    if let Err(e) = handle_line_inner(gateway, conn, line).await {
        error!("[dispatch:{}] turn failed: {}", conn.key, e);
        let skey = gateway.session_key(conn);
        let _ = gateway.db.log_error("TurnProcessing", &e, Some(&skey), None).await;
        gateway.send_to_station(conn, "Internal error. Please try again.\n> ").await;
    }
}

async fn handle_line_inner(gateway: &Gateway, conn: &ConnRef, line: &str) -> Result<(), String> {
    let skey = gateway.session_key(conn);

    // ── Login gate ──────────────────────────────────────────────────
    if !gateway.sessions.is_authenticated(&skey).await {
        let candidate = line.to_uppercase();
        if !pgate_core::is_valid_callsign(&candidate) {
            gateway
                .send_to_station(
                    conn,
                    "\nInvalid callsign format. Please enter a valid amateur radio callsign: ",
                )
                .await;
            return Ok(());
        }
        auth::authenticate(gateway, conn, &candidate).await;
        return Ok(());
    }

    info!("[dispatch:{}] {}", conn.key, line);
    let lower = line.to_lowercase();

    // ── Built-in commands ───────────────────────────────────────────
    if lower == "help" || lower == "?" {
        gateway.send_to_station(conn, &format!("{}> ", HELP_TEXT)).await;
        return Ok(());
    }

    if EXIT_COMMANDS.contains(&lower.as_str()) {
        info!("[dispatch:{}] exit command", conn.key);
        gateway.send_to_station(conn, "73! Goodbye.\n").await;
        // Let the farewell reach the operator before the close.
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        gateway.disconnect_station(conn).await;
        return Ok(());
    }

    if lower == "status" {
        let status = gateway.rate.status(&skey).await;
        let mut text = RateLimiter::format_status(status.as_ref());
        if let Some(snapshot) = gateway.sessions.snapshot(&skey).await {
            text.push_str(&format!("\n\nSession: {} messages in history", snapshot.messages));
        }
        gateway.send_to_station(conn, &format!("{}\n> ", text)).await;
        return Ok(());
    }

    if lower == "clear" || lower == "reset" {
        gateway.sessions.clear(&skey).await;
        gateway.send_to_station(conn, "Conversation history cleared.\n> ").await;
        return Ok(());
    }

    // ── File commands ───────────────────────────────────────────────
    if lower.starts_with("/files") || lower.starts_with("/list") {
        files::handle_files_command(gateway, conn, line).await;
        return Ok(());
    }
    if lower.starts_with("/download") {
        files::handle_download_command(gateway, conn, line).await;
        return Ok(());
    }
    if lower.starts_with("/fileinfo") {
        files::handle_fileinfo_command(gateway, conn, line).await;
        return Ok(());
    }
    if lower.starts_with("/share") {
        files::handle_share_command(gateway, conn, line).await;
        return Ok(());
    }
    if lower.starts_with("/publicfile") {
        files::handle_publicfile_command(gateway, conn, line).await;
        return Ok(());
    }
    if lower.starts_with("/deletefile") {
        files::handle_deletefile_command(gateway, conn, line).await;
        return Ok(());
    }
    if lower.starts_with("/upload") {
        files::handle_upload_command(gateway, conn, line).await;
        return Ok(());
    }

    // ── Rate gate ───────────────────────────────────────────────────
    let (allowed, reason) = gateway.rate.check(&skey).await;
    if !allowed {
        let reason = reason.unwrap_or_else(|| "Rate limited".to_string());
        gateway
            .send_to_station(
                conn,
                &format!(
                    "Rate limit exceeded: {}\nPlease try again later. Type 'status' for details.\n> ",
                    reason
                ),
            )
            .await;
        return Ok(());
    }

    // ── LLM turn ────────────────────────────────────────────────────
    let connection_id = connection_id_for(gateway, conn).await;
    let history: Vec<ChatTurn> = gateway
        .sessions
        .history(&skey)
        .await
        .into_iter()
        .map(|m| ChatTurn {
            role: match m.role {
                ChatRole::User => "user".to_string(),
                ChatRole::Assistant => "assistant".to_string(),
            },
            content: m.content,
        })
        .collect();

    // Tell the model which connection is asking so tools get the right
    // callsign.
    let contextual =
        format!("[Connection: {} via {}] {}", conn.key, conn.transport.name(), line);

    gateway.send_to_station(conn, "...\n").await;

    let started = Instant::now();
    let outcome = gateway.engine.run(&history, &contextual).await;
    let elapsed_ms = started.elapsed().as_millis() as i64;

    if let Some(err) = outcome.error {
        gateway
            .db
            .log_error("TurnEngine", &err, Some(&skey), None)
            .await
            .map_err(|e| e.to_string())?;
        gateway
            .db
            .log_query(
                &skey,
                line,
                QueryLog {
                    error: Some(err.clone()),
                    response_time_ms: Some(elapsed_ms),
                    connection_id,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| e.to_string())?;
        gateway
            .send_to_station(conn, &format!("Error: {}\nPlease try again.\n> ", err))
            .await;
        return Ok(());
    }

    let mut response = outcome.text.unwrap_or_default();

    gateway.sessions.add_user_message(&skey, line).await;
    gateway.sessions.add_assistant_message(&skey, &response).await;
    gateway.activity.add(&skey, "query", "");

    gateway
        .db
        .log_query(
            &skey,
            line,
            QueryLog {
                response: Some(response.clone()),
                tokens_used: Some(outcome.tokens_used as i64),
                response_time_ms: Some(elapsed_ms),
                connection_id,
                ..Default::default()
            },
        )
        .await
        .map_err(|e| e.to_string())?;

    // ── Truncation + delivery ───────────────────────────────────────
    let max_chars = gateway.config.rate_limits.max_response_chars;
    if response.chars().count() > max_chars {
        response = response.chars().take(max_chars).collect();
        response.push_str(&format!("\n\n[Response truncated at {} chars]", max_chars));
    }

    gateway.send_to_station(conn, &format!("{}\n> ", response)).await;
    Ok(())
}

async fn connection_id_for(gateway: &Gateway, conn: &ConnRef) -> Option<i64> {
    match conn.transport {
        crate::gateway::Transport::Telnet => match &gateway.telnet {
            Some(telnet) => telnet.connection_id(&conn.key).await,
            None => None,
        },
        crate::gateway::Transport::Ax25 => match &gateway.link {
            Some(link) => link.lock().await.connection(&conn.key).and_then(|c| c.connection_id),
            None => None,
        },
    }
}
