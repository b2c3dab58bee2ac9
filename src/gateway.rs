//! Gateway core: owns every component and routes transport events to the
//! dispatcher.
//!
//! Each connection gets a worker task fed through an mpsc queue, so lines
//! from one operator are processed strictly in order while different
//! operators proceed independently. Transport reads never block on LLM or
//! tool traffic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::sync::{mpsc, Mutex};

use pgate_agent::{AnthropicClient, LlmTransport, ToolRegistry, TurnEngine, TurnSettings};
use pgate_ax25::{LinkEvent, LinkManager};
use pgate_db::Database;
use pgate_kiss::{KissTnc, KissTncHandle};
use pgate_session::{RateLimiter, SessionStore};
use pgate_telnet::{TelnetEvent, TelnetServer};
use pgate_tools::{
    register_band_conditions_tool, register_bbs_tool, register_chat_tool, register_dx_tool,
    register_file_tool, register_message_tool, register_pota_tool, register_qrz_tool,
    register_search_tool, BandConditions, DxCluster, PotaSpots, QrzClient, WebSearch,
};
use pgate_yapp::YappEvent;

use crate::activity::ActivityFeed;
use crate::config::Config;
use crate::control::GatewayControl;
use crate::radio::PttController;
use crate::{auth, dispatcher, files, sweeper};

/// Which transport a connection arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Ax25,
    Telnet,
}

impl Transport {
    pub fn name(&self) -> &'static str {
        match self {
            Transport::Ax25 => "ax25",
            Transport::Telnet => "telnet",
        }
    }
}

/// Lightweight reference to one connection: transport plus its current key.
#[derive(Debug, Clone)]
pub struct ConnRef {
    pub key: String,
    pub transport: Transport,
}

impl ConnRef {
    pub fn ax25(key: impl Into<String>) -> Self {
        Self { key: key.into(), transport: Transport::Ax25 }
    }

    pub fn telnet(key: impl Into<String>) -> Self {
        Self { key: key.into(), transport: Transport::Telnet }
    }
}

/// Max UI frame payload per fragment on AX.25.
pub const AX25_CHUNK_SIZE: usize = 200;
/// Spacing between fragments (half-duplex turnaround).
pub const AX25_CHUNK_DELAY: Duration = Duration::from_millis(100);

pub struct GatewayInner {
    pub config: Config,
    pub db: Database,
    pub sessions: SessionStore,
    pub rate: RateLimiter,
    pub engine: TurnEngine,
    pub qrz: Arc<QrzClient>,
    pub activity: ActivityFeed,
    pub telnet: Option<Arc<TelnetServer>>,
    pub link: Option<Arc<Mutex<LinkManager>>>,
    pub tnc: Option<KissTncHandle>,
    pub ptt: Box<dyn PttController>,
    pub started_at: DateTime<Utc>,
    running: AtomicBool,
    stopped: AtomicBool,
    /// Per-connection line queues (serializes dispatch per session).
    workers: Mutex<HashMap<String, mpsc::Sender<(ConnRef, String)>>>,
    /// Serializes the two-table identity rekey at telnet login.
    pub auth_lock: Mutex<()>,
}

/// Cheap-clone handle to the whole gateway.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl std::ops::Deref for Gateway {
    type Target = GatewayInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Gateway {
    /// Build every component per the config. Fatal failures (TNC, telnet in
    /// telnet-only mode, missing API key) surface as `Err` before any loop
    /// starts.
    pub async fn build(
        config: Config,
        enable_kiss: bool,
        enable_telnet: bool,
    ) -> Result<(Gateway, GatewayTasks), String> {
        let api_key = Config::anthropic_api_key()?;
        let client = Arc::new(AnthropicClient::new(&api_key, 60)?);
        Self::build_with_transport(config, enable_kiss, enable_telnet, client).await
    }

    /// Build with an explicit model transport. Production passes the real
    /// API client; the test harness passes a scripted one.
    pub async fn build_with_transport(
        config: Config,
        enable_kiss: bool,
        enable_telnet: bool,
        transport: Arc<dyn LlmTransport>,
    ) -> Result<(Gateway, GatewayTasks), String> {
        info!("[gateway] initializing components");
        let db = Database::open(&config.database.path).await.map_err(|e| e.to_string())?;
        let sessions = SessionStore::new(config.sessions.max_context_messages);
        let rate = RateLimiter::new(
            db.clone(),
            config.rate_limits.queries_per_hour,
            config.rate_limits.queries_per_day,
            config.rate_limits.enabled,
        );
        let qrz = Arc::new(QrzClient::new(
            &Config::qrz_username(),
            &Config::qrz_password(),
            &Config::qrz_api_key(),
        ));
        let activity = ActivityFeed::new();

        // ── Transports ──────────────────────────────────────────────
        let (telnet, telnet_events) = if enable_telnet {
            match TelnetServer::start(&config.telnet.host, config.telnet.port).await {
                Ok((server, events)) => (Some(Arc::new(server)), Some(events)),
                Err(e) => {
                    if enable_kiss {
                        warn!("[gateway] telnet unavailable, continuing without it: {}", e);
                        (None, None)
                    } else {
                        return Err(format!("Failed to start telnet server: {}", e));
                    }
                }
            }
        } else {
            info!("[gateway] telnet server disabled");
            (None, None)
        };

        let (link, tnc_handle, kiss_frames, link_events) = if enable_kiss {
            let tnc =
                KissTnc::connect(&config.direwolf.host, config.direwolf.port, config.direwolf.timeout)
                    .await
                    .map_err(|e| {
                        format!(
                            "Failed to connect to KISS TNC at {}:{}: {} \
                             (is the TNC running, or use --telnet-only?)",
                            config.direwolf.host, config.direwolf.port, e
                        )
                    })?;
            let (base, ssid) = pgate_core::parse_callsign(&config.station.callsign);
            let (link, events) = LinkManager::new(tnc.handle.clone(), &base, ssid);
            (Some(Arc::new(Mutex::new(link))), Some(tnc.handle), Some(tnc.frames), Some(events))
        } else {
            info!("[gateway] KISS/TNC disabled (telnet-only mode)");
            (None, None, None, None)
        };

        let ptt = crate::radio::from_config(&config.radio);
        if enable_kiss {
            info!("[gateway] radio: {}", ptt.description());
        }

        // ── Tools + engine ──────────────────────────────────────────
        let mut registry = ToolRegistry::new();
        if config.search.enabled {
            register_search_tool(&mut registry, Arc::new(WebSearch::new(config.search.max_results)));
        }
        if config.pota.enabled {
            register_pota_tool(&mut registry, Arc::new(PotaSpots::new(config.pota.max_spots)));
        }
        if config.band_conditions.enabled {
            register_band_conditions_tool(&mut registry, Arc::new(BandConditions::new()));
        }
        if config.dx_cluster.enabled {
            register_dx_tool(&mut registry, Arc::new(DxCluster::new(config.dx_cluster.max_spots)));
        }
        if qrz.is_enabled() {
            register_qrz_tool(&mut registry, qrz.clone());
        }
        register_message_tool(&mut registry, db.clone());
        register_file_tool(&mut registry, db.clone());
        register_chat_tool(&mut registry, db.clone());
        register_bbs_tool(
            &mut registry,
            Arc::new(GatewayControl::new(
                sessions.clone(),
                db.clone(),
                activity.clone(),
                telnet.clone(),
                link.clone(),
                Utc::now(),
            )),
        );

        let engine = TurnEngine::new(
            transport,
            registry,
            TurnSettings {
                model: config.claude.model.clone(),
                max_tokens: config.claude.max_tokens,
                temperature: config.claude.temperature,
                system_prompt: config.claude.system_prompt.clone(),
                max_tool_iterations: 5,
            },
        );
        info!("[gateway] {} tools registered", engine.tool_count());

        // The main public chat channel always exists.
        db.get_or_create_channel("MAIN", "SYSOP", Some("Main public chat channel"))
            .await
            .map_err(|e| e.to_string())?;

        let gateway = Gateway {
            inner: Arc::new(GatewayInner {
                config,
                db,
                sessions,
                rate,
                engine,
                qrz,
                activity,
                telnet,
                link,
                tnc: tnc_handle,
                ptt,
                started_at: Utc::now(),
                running: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
                workers: Mutex::new(HashMap::new()),
                auth_lock: Mutex::new(()),
            }),
        };

        Ok((gateway, GatewayTasks { telnet_events, kiss_frames, link_events }))
    }

    /// Spawn the event loops and the background sweeper.
    pub fn start(&self, tasks: GatewayTasks) {
        if let Some(mut events) = tasks.telnet_events {
            let gateway = self.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    gateway.handle_telnet_event(event).await;
                }
            });
        }

        if let (Some(mut frames), Some(link)) = (tasks.kiss_frames, self.link.clone()) {
            let gateway = self.clone();
            tokio::spawn(async move {
                while let Some(frame) = frames.recv().await {
                    if !gateway.is_running() {
                        break;
                    }
                    link.lock().await.handle_frame(&frame).await;
                }
            });
        }

        if let Some(mut events) = tasks.link_events {
            let gateway = self.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    gateway.handle_link_event(event).await;
                }
            });
        }

        let gateway = self.clone();
        tokio::spawn(async move {
            sweeper::run(gateway).await;
        });

        if let Some(telnet) = &self.telnet {
            info!("[gateway] ready - telnet on {}:{}", telnet.host(), telnet.port());
        }
        if self.link.is_some() {
            info!("[gateway] ready - listening as {}", self.config.station.callsign);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Tear everything down. Idempotent: the second call is a no-op.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("[gateway] stopping");
        self.running.store(false, Ordering::Relaxed);

        if let Some(link) = &self.link {
            link.lock().await.disconnect_all().await;
        }
        if let Some(telnet) = &self.telnet {
            telnet.stop().await;
        }
        if let Some(tnc) = &self.tnc {
            tnc.shutdown();
        }
        self.workers.lock().await.clear();
        self.db.close().await;
        info!("[gateway] stopped");
    }

    // ── Session identity ────────────────────────────────────────────

    /// The session-store key for a connection. AX.25 peers map to their base
    /// callsign; telnet peers keep their table key (ip:port until login,
    /// callsign afterwards).
    pub fn session_key(&self, conn: &ConnRef) -> String {
        match conn.transport {
            Transport::Ax25 => pgate_core::normalize_callsign(&conn.key),
            Transport::Telnet => conn.key.clone(),
        }
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Deliver text to a station, fragmenting per transport rules.
    pub async fn send_to_station(&self, conn: &ConnRef, message: &str) {
        match conn.transport {
            Transport::Telnet => {
                if let Some(telnet) = &self.telnet {
                    if let Err(e) = telnet.send(&conn.key, message.as_bytes()).await {
                        warn!("[gateway] telnet send to {} failed: {}", conn.key, e);
                    }
                }
            }
            Transport::Ax25 => {
                let Some(link) = &self.link else {
                    return;
                };
                // Packet terminals expect bare CR line endings.
                let message = message.replace("\r\n", "\n").replace('\n', "\r");
                let bytes = message.as_bytes();

                let mut offset = 0;
                while offset < bytes.len() {
                    let end = (offset + AX25_CHUNK_SIZE).min(bytes.len());
                    let chunk = &bytes[offset..end];
                    if let Err(e) = link.lock().await.send_data(&conn.key, chunk).await {
                        warn!("[gateway] ax25 send to {} failed: {}", conn.key, e);
                        break;
                    }
                    offset = end;
                    if offset < bytes.len() {
                        tokio::time::sleep(AX25_CHUNK_DELAY).await;
                    }
                }
            }
        }
    }

    /// Disconnect a station via its own transport.
    pub async fn disconnect_station(&self, conn: &ConnRef) {
        match conn.transport {
            Transport::Telnet => {
                if let Some(telnet) = &self.telnet {
                    telnet.disconnect(&conn.key).await;
                }
            }
            Transport::Ax25 => {
                if let Some(link) = &self.link {
                    link.lock().await.disconnect(&conn.key).await;
                }
            }
        }
    }

    // ── Worker plumbing ─────────────────────────────────────────────

    /// Queue a line for the connection's worker, creating the worker on
    /// first use.
    async fn dispatch_line(&self, conn: ConnRef, line: String) {
        // Clone the sender out so the table lock is not held across the
        // queue send (the worker itself takes this lock during rekey).
        let sender = {
            let mut workers = self.workers.lock().await;
            workers
                .entry(conn.key.clone())
                .or_insert_with(|| {
                    let (tx, mut rx) = mpsc::channel::<(ConnRef, String)>(32);
                    let gateway = self.clone();
                    tokio::spawn(async move {
                        while let Some((conn, line)) = rx.recv().await {
                            dispatcher::handle_line(&gateway, &conn, &line).await;
                        }
                    });
                    tx
                })
                .clone()
        };

        if sender.send((conn, line)).await.is_err() {
            warn!("[gateway] worker queue closed");
        }
    }

    /// Move a worker queue to a new key (telnet login rekey).
    pub async fn rekey_worker(&self, old_key: &str, new_key: &str) {
        if old_key == new_key {
            return;
        }
        let mut workers = self.workers.lock().await;
        if let Some(sender) = workers.remove(old_key) {
            workers.insert(new_key.to_string(), sender);
        }
    }

    pub async fn remove_worker(&self, key: &str) {
        self.workers.lock().await.remove(key);
    }

    // ── Telnet events ───────────────────────────────────────────────

    async fn handle_telnet_event(&self, event: TelnetEvent) {
        match event {
            TelnetEvent::Connected { key } => {
                info!("[gateway] telnet connection from {}", key);
                let conn = ConnRef::telnet(key.as_str());
                match self.db.log_connection(&key).await {
                    Ok(id) => {
                        if let Some(telnet) = &self.telnet {
                            telnet.set_connection_id(&key, id).await;
                        }
                    }
                    Err(e) => error!("[gateway] failed to log connection: {}", e),
                }
                self.sessions.ensure(&key).await;
                let prompt =
                    format!("{}\n\nCallsign: ", self.config.station.welcome_message.trim_end());
                self.send_to_station(&conn, &prompt).await;
            }
            TelnetEvent::Identity { key, callsign } => {
                // RFC 1572 identity short-circuits the login prompt.
                if self.sessions.is_authenticated(&self.session_key(&ConnRef::telnet(key.as_str()))).await {
                    return;
                }
                if !pgate_core::is_valid_callsign(&callsign) {
                    warn!("[gateway] ignoring invalid NEW-ENVIRON identity '{}'", callsign);
                    return;
                }
                let conn = ConnRef::telnet(key.as_str());
                auth::authenticate(self, &conn, &callsign).await;
            }
            TelnetEvent::Line { key, line } => {
                self.dispatch_line(ConnRef::telnet(key), line).await;
            }
            TelnetEvent::Disconnected { key, connection_id, lines_received, writes_sent } => {
                self.on_disconnected(
                    ConnRef::telnet(key),
                    connection_id,
                    writes_sent as i64,
                    lines_received as i64,
                )
                .await;
            }
        }
    }

    // ── AX.25 events ────────────────────────────────────────────────

    async fn handle_link_event(&self, event: LinkEvent) {
        match event {
            LinkEvent::Connected { key } => {
                info!("[gateway] ax25 connection from {}", key);
                let conn = ConnRef::ax25(key.as_str());
                let callsign = pgate_core::normalize_callsign(&key);

                match self.db.log_connection(&callsign).await {
                    Ok(id) => {
                        if let Some(link) = &self.link {
                            if let Some(c) = link.lock().await.connection_mut(&key) {
                                c.connection_id = Some(id);
                            }
                        }
                    }
                    Err(e) => error!("[gateway] failed to log connection: {}", e),
                }

                // The link layer already authenticated the callsign by
                // carrying it; greet or re-greet accordingly.
                if self.sessions.is_authenticated(&callsign).await {
                    let welcome = format!("{}\n", self.config.station.welcome_message.trim_end());
                    self.send_to_station(&conn, &welcome).await;
                } else {
                    auth::authenticate(self, &conn, &callsign).await;
                }
            }
            LinkEvent::Data { key, payload } => {
                let line = String::from_utf8_lossy(&payload).to_string();
                self.dispatch_line(ConnRef::ax25(key), line).await;
            }
            LinkEvent::Disconnected { key, connection_id, packets_sent, packets_received } => {
                self.on_disconnected(
                    ConnRef::ax25(key),
                    connection_id,
                    packets_sent as i64,
                    packets_received as i64,
                )
                .await;
            }
            LinkEvent::Yapp { key, event } => {
                self.handle_yapp_event(key, event).await;
            }
        }
    }

    async fn handle_yapp_event(&self, key: String, event: YappEvent) {
        let conn = ConnRef::ax25(key.as_str());
        match event {
            YappEvent::UploadComplete { filename, data } => {
                files::on_upload_complete(self, &conn, &filename, data).await;
            }
            YappEvent::DownloadComplete { filename } => {
                info!("[gateway] YAPP download of {} to {} complete", filename, key);
                self.activity.add(&self.session_key(&conn), "download", &filename);
                self.send_to_station(&conn, "\nDownload complete!\n> ").await;
            }
            YappEvent::Failed { reason } => {
                warn!("[gateway] YAPP transfer with {} failed: {}", key, reason);
                self.send_to_station(&conn, "\nFile transfer failed or was cancelled.\n> ").await;
            }
        }
    }

    // ── Disconnect bookkeeping ──────────────────────────────────────

    async fn on_disconnected(
        &self,
        conn: ConnRef,
        connection_id: Option<i64>,
        sent: i64,
        received: i64,
    ) {
        info!("[gateway] disconnection from {}", conn.key);
        let skey = self.session_key(&conn);

        // Presence does not survive the link.
        if let Err(e) = self.db.leave_all_channels(&skey).await {
            warn!("[gateway] presence cleanup failed: {}", e);
        }

        if let Some(id) = connection_id {
            if let Err(e) = self.db.log_disconnection(id, sent, received).await {
                warn!("[gateway] failed to log disconnection: {}", e);
            }
        }

        self.activity.add(&skey, "disconnect", "");

        // timeout == 0 means sessions do not outlive the connection.
        if self.config.sessions.timeout == 0 {
            self.sessions.remove(&skey).await;
        }
        self.remove_worker(&conn.key).await;
    }
}

/// Receivers handed from `build` to `start`.
pub struct GatewayTasks {
    pub telnet_events: Option<mpsc::Receiver<TelnetEvent>>,
    pub kiss_frames: Option<mpsc::Receiver<Vec<u8>>>,
    pub link_events: Option<mpsc::UnboundedReceiver<LinkEvent>>,
}
