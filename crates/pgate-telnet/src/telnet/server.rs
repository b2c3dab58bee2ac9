//! Inbound telnet server.
//!
//! One listener task accepts TCP callers; each connection gets a read task
//! (IAC stripping, NEW-ENVIRON identity sniffing, line buffering) and a
//! write task fed by an mpsc channel. Connections are keyed by `ip:port`
//! until authentication rekeys them to the operator's callsign.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};

use crate::telnet::codec::{TelnetCodec, TelnetItem};
use crate::telnet::protocol::{self, NEW_ENVIRON};
use crate::telnet::types::{TelnetConnectionInfo, TelnetError, TelnetErrorKind, TelnetResult};

/// Events surfaced to the gateway.
#[derive(Debug)]
pub enum TelnetEvent {
    /// A TCP caller arrived; key is `ip:port`.
    Connected { key: String },
    /// A complete inbound text line (already stripped of telnet commands).
    Line { key: String, line: String },
    /// The client volunteered USER/LOGNAME via NEW-ENVIRON.
    Identity { key: String, callsign: String },
    /// The connection went away (peer close, error, reaper, or disconnect).
    /// Carries the final counters for the connection log.
    Disconnected { key: String, connection_id: Option<i64>, lines_received: u64, writes_sent: u64 },
}

enum WriteCmd {
    Data(Vec<u8>),
    Close,
}

struct ConnEntry {
    writer_tx: mpsc::Sender<WriteCmd>,
    connected: Arc<AtomicBool>,
    /// Current table key, shared with the read task so events follow a rekey.
    shared_key: Arc<StdMutex<String>>,
    peer_addr: String,
    callsign: Option<String>,
    connected_at: chrono::DateTime<chrono::Utc>,
    last_activity: Arc<AtomicU64>,
    lines_received: Arc<AtomicU64>,
    writes_sent: Arc<AtomicU64>,
    connection_id: Option<i64>,
}

type ConnTable = Arc<Mutex<HashMap<String, ConnEntry>>>;

/// The telnet listener plus its connection table.
pub struct TelnetServer {
    connections: ConnTable,
    events_tx: mpsc::Sender<TelnetEvent>,
    running: Arc<AtomicBool>,
    host: String,
    port: u16,
}

impl TelnetServer {
    /// Bind and start accepting. Returns the server handle and the event
    /// stream the gateway consumes.
    pub async fn start(host: &str, port: u16) -> TelnetResult<(Self, mpsc::Receiver<TelnetEvent>)> {
        let listener = TcpListener::bind((host, port)).await.map_err(|e| {
            TelnetError::bind_failed(format!("Failed to bind {}:{}: {}", host, port, e))
        })?;
        let bound = listener.local_addr().map_err(TelnetError::from)?;
        log::info!("[telnet] listening on {}", bound);

        let (events_tx, events_rx) = mpsc::channel(256);
        let connections: ConnTable = Arc::new(Mutex::new(HashMap::new()));
        let running = Arc::new(AtomicBool::new(true));

        let accept_connections = connections.clone();
        let accept_events = events_tx.clone();
        let accept_running = running.clone();
        tokio::spawn(async move {
            accept_loop(listener, accept_connections, accept_events, accept_running).await;
        });

        Ok((
            Self {
                connections,
                events_tx,
                running,
                host: host.to_string(),
                port: bound.port(),
            },
            events_rx,
        ))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Send raw bytes to a connection.
    pub async fn send(&self, key: &str, data: &[u8]) -> TelnetResult<()> {
        // Clone the sender out so the table lock is not held while the
        // writer queue drains.
        let writer_tx = {
            let connections = self.connections.lock().await;
            let entry = connections
                .get(key)
                .ok_or_else(|| TelnetError::connection_not_found(key))?;
            entry.writes_sent.fetch_add(1, Ordering::Relaxed);
            entry.writer_tx.clone()
        };
        writer_tx
            .send(WriteCmd::Data(data.to_vec()))
            .await
            .map_err(|_| TelnetError::disconnected("Write channel closed"))
    }

    /// Ask a connection to close. The read task emits the Disconnected event
    /// once the socket is gone.
    pub async fn disconnect(&self, key: &str) {
        let connections = self.connections.lock().await;
        if let Some(entry) = connections.get(key) {
            entry.connected.store(false, Ordering::Relaxed);
            let _ = entry.writer_tx.send(WriteCmd::Close).await;
        }
    }

    /// Atomically move a connection from its network key to its callsign key
    /// and record the callsign. The single table lock spans the whole swap.
    pub async fn rekey(&self, old_key: &str, new_key: &str) -> TelnetResult<()> {
        if old_key == new_key {
            return Ok(());
        }
        let mut connections = self.connections.lock().await;
        if connections.contains_key(new_key) {
            return Err(TelnetError::new(
                TelnetErrorKind::KeyCollision,
                format!("Connection key '{}' already in use", new_key),
            ));
        }
        let mut entry = connections
            .remove(old_key)
            .ok_or_else(|| TelnetError::connection_not_found(old_key))?;
        entry.callsign = Some(new_key.to_string());
        if let Ok(mut shared) = entry.shared_key.lock() {
            *shared = new_key.to_string();
        }
        connections.insert(new_key.to_string(), entry);
        log::debug!("[telnet] rekeyed connection {} -> {}", old_key, new_key);
        Ok(())
    }

    /// Record the database connection-log row id.
    pub async fn set_connection_id(&self, key: &str, id: i64) {
        let mut connections = self.connections.lock().await;
        if let Some(entry) = connections.get_mut(key) {
            entry.connection_id = Some(id);
        }
    }

    pub async fn connection_id(&self, key: &str) -> Option<i64> {
        self.connections.lock().await.get(key).and_then(|e| e.connection_id)
    }

    pub async fn callsign(&self, key: &str) -> Option<String> {
        self.connections.lock().await.get(key).and_then(|e| e.callsign.clone())
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.connections.lock().await.contains_key(key)
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn list_connections(&self) -> Vec<TelnetConnectionInfo> {
        let connections = self.connections.lock().await;
        connections
            .iter()
            .map(|(key, e)| TelnetConnectionInfo {
                key: key.clone(),
                peer_addr: e.peer_addr.clone(),
                callsign: e.callsign.clone(),
                connected_at: e.connected_at.to_rfc3339(),
                lines_received: e.lines_received.load(Ordering::Relaxed),
                writes_sent: e.writes_sent.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Close connections idle past `timeout`.
    pub async fn cleanup_stale(&self, timeout: Duration) {
        let now_ms = chrono::Utc::now().timestamp_millis() as u64;
        let stale: Vec<String> = {
            let connections = self.connections.lock().await;
            connections
                .iter()
                .filter(|(_, e)| {
                    let last = e.last_activity.load(Ordering::Relaxed);
                    now_ms.saturating_sub(last) > timeout.as_millis() as u64
                })
                .map(|(k, _)| k.clone())
                .collect()
        };

        for key in stale {
            log::info!("[telnet] removing stale connection {}", key);
            self.disconnect(&key).await;
        }
    }

    /// Stop accepting and close every connection. Safe to call twice.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        log::info!("[telnet] stopping server");
        let keys: Vec<String> = self.connections.lock().await.keys().cloned().collect();
        for key in keys {
            self.disconnect(&key).await;
        }
    }
}

// ── Accept loop ─────────────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    connections: ConnTable,
    events_tx: mpsc::Sender<TelnetEvent>,
    running: Arc<AtomicBool>,
) {
    loop {
        if !running.load(Ordering::Relaxed) {
            break;
        }

        let accepted = match tokio::time::timeout(Duration::from_secs(1), listener.accept()).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                if running.load(Ordering::Relaxed) {
                    log::error!("[telnet] accept error: {}", e);
                }
                continue;
            }
            Err(_) => continue, // periodic running-flag check
        };

        let (stream, peer) = accepted;
        let key = format!("{}:{}", peer.ip(), peer.port());
        log::info!("[telnet] new connection from {}", key);
        spawn_connection(stream, key, connections.clone(), events_tx.clone(), running.clone())
            .await;
    }

    log::info!("[telnet] accept loop exited");
}

async fn spawn_connection(
    stream: TcpStream,
    key: String,
    connections: ConnTable,
    events_tx: mpsc::Sender<TelnetEvent>,
    running: Arc<AtomicBool>,
) {
    let (read_half, write_half) = stream.into_split();
    let (writer_tx, writer_rx) = mpsc::channel::<WriteCmd>(64);

    let connected = Arc::new(AtomicBool::new(true));
    let shared_key = Arc::new(StdMutex::new(key.clone()));
    let now_ms = chrono::Utc::now().timestamp_millis() as u64;
    let last_activity = Arc::new(AtomicU64::new(now_ms));
    let lines_received = Arc::new(AtomicU64::new(0));
    let writes_sent = Arc::new(AtomicU64::new(0));

    let entry = ConnEntry {
        writer_tx: writer_tx.clone(),
        connected: connected.clone(),
        shared_key: shared_key.clone(),
        peer_addr: key.clone(),
        callsign: None,
        connected_at: chrono::Utc::now(),
        last_activity: last_activity.clone(),
        lines_received: lines_received.clone(),
        writes_sent: writes_sent.clone(),
        connection_id: None,
    };
    connections.lock().await.insert(key.clone(), entry);

    // Solicit the client's environment before anything else; clients that
    // support RFC 1572 answer with USER/LOGNAME and skip the login prompt.
    let _ = writer_tx.send(WriteCmd::Data(protocol::build_do_new_environ())).await;
    let _ = writer_tx.send(WriteCmd::Data(protocol::build_env_send_request())).await;

    let _ = events_tx.send(TelnetEvent::Connected { key: key.clone() }).await;

    // Write task.
    let write_connected = connected.clone();
    tokio::spawn(async move {
        write_loop(write_half, writer_rx, write_connected).await;
    });

    // Read task.
    tokio::spawn(async move {
        read_loop(
            read_half,
            connections,
            events_tx,
            connected,
            shared_key,
            last_activity,
            lines_received,
            running,
        )
        .await;
    });
}

// ── Write loop ──────────────────────────────────────────────────────────

async fn write_loop(
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    mut rx: mpsc::Receiver<WriteCmd>,
    connected: Arc<AtomicBool>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WriteCmd::Data(data) => {
                if let Err(e) = writer.write_all(&data).await {
                    log::warn!("[telnet] write error: {}", e);
                    connected.store(false, Ordering::Relaxed);
                    break;
                }
            }
            WriteCmd::Close => {
                let _ = writer.shutdown().await;
                connected.store(false, Ordering::Relaxed);
                break;
            }
        }
    }
}

// ── Read loop ───────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
async fn read_loop(
    mut reader: tokio::net::tcp::OwnedReadHalf,
    connections: ConnTable,
    events_tx: mpsc::Sender<TelnetEvent>,
    connected: Arc<AtomicBool>,
    shared_key: Arc<StdMutex<String>>,
    last_activity: Arc<AtomicU64>,
    lines_received: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
) {
    let mut codec = TelnetCodec::new();
    let mut line_buf: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];

    let current_key = || shared_key.lock().map(|k| k.clone()).unwrap_or_default();

    loop {
        if !connected.load(Ordering::Relaxed) || !running.load(Ordering::Relaxed) {
            break;
        }

        let n = match tokio::time::timeout(Duration::from_secs(1), reader.read(&mut buf)).await {
            Ok(Ok(0)) => {
                log::info!("[telnet:{}] connection closed by peer", current_key());
                break;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                log::warn!("[telnet:{}] read error: {}", current_key(), e);
                break;
            }
            Err(_) => continue, // periodic flag check
        };

        last_activity.store(chrono::Utc::now().timestamp_millis() as u64, Ordering::Relaxed);

        for item in codec.decode(&buf[..n]) {
            match item {
                TelnetItem::Data(data) => {
                    line_buf.extend_from_slice(&data);
                    for line in drain_lines(&mut line_buf) {
                        if line.is_empty() {
                            continue;
                        }
                        lines_received.fetch_add(1, Ordering::Relaxed);
                        let _ = events_tx
                            .send(TelnetEvent::Line { key: current_key(), line })
                            .await;
                    }
                }
                TelnetItem::SubNegotiation { option, data } if option == NEW_ENVIRON => {
                    if let Some(login) = protocol::extract_login_name(&data) {
                        let callsign = pgate_core::normalize_callsign(&login);
                        log::info!(
                            "[telnet:{}] NEW-ENVIRON identity: {}",
                            current_key(),
                            callsign
                        );
                        let _ = events_tx
                            .send(TelnetEvent::Identity { key: current_key(), callsign })
                            .await;
                    }
                }
                TelnetItem::Negotiation { command, option } => {
                    // Acknowledge by ignoring.
                    log::debug!(
                        "[telnet:{}] negotiation {:02x} option {}",
                        current_key(),
                        command,
                        option
                    );
                }
                TelnetItem::SubNegotiation { option, .. } => {
                    log::debug!("[telnet:{}] ignoring SB option {}", current_key(), option);
                }
                TelnetItem::Command(cmd) => {
                    log::debug!("[telnet:{}] command {:02x}", current_key(), cmd);
                }
            }
        }
    }

    connected.store(false, Ordering::Relaxed);
    let key = current_key();
    let removed = connections.lock().await.remove(&key);
    let (connection_id, lines, writes) = removed
        .map(|e| {
            (
                e.connection_id,
                e.lines_received.load(Ordering::Relaxed),
                e.writes_sent.load(Ordering::Relaxed),
            )
        })
        .unwrap_or((None, 0, 0));
    let _ = events_tx
        .send(TelnetEvent::Disconnected {
            key,
            connection_id,
            lines_received: lines,
            writes_sent: writes,
        })
        .await;
}

/// Split complete lines (on `\r\n`, `\n`, or `\r`) out of the buffer,
/// leaving any partial trailing line in place.
fn drain_lines(buf: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();

    loop {
        let Some(pos) = buf.iter().position(|&b| b == b'\r' || b == b'\n') else {
            break;
        };

        // A trailing \r might be the first half of \r\n arriving in the next
        // chunk; wait for more bytes before deciding.
        if buf[pos] == b'\r' && pos + 1 == buf.len() {
            break;
        }

        let line_bytes: Vec<u8> = buf.drain(..pos).collect();
        let sep = buf.remove(0);
        if sep == b'\r' && buf.first() == Some(&b'\n') {
            buf.remove(0);
        }

        lines.push(String::from_utf8_lossy(&line_bytes).to_string());
    }

    lines
}
