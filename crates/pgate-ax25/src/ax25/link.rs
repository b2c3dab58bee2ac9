//! AX.25 link manager.
//!
//! Owns the per-station connection table, answers the SABM/UA/DISC/DM
//! handshake, fans UI payloads out to the gateway as [`LinkEvent`]s, and
//! routes YAPP packets to the transfer engine. Outbound payloads travel as
//! UI frames; connected-mode windowing is deliberately not implemented, so a
//! lossy RF path may deliver partial or duplicated lines upstream.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;

use pgate_kiss::KissTncHandle;
use pgate_yapp::{is_yapp_packet, YappEvent, YappManager};

use crate::ax25::frame::Ax25Frame;
use crate::ax25::types::{Ax25Error, Ax25Result, AxConnection, ConnectionState};

/// Events surfaced to the gateway.
#[derive(Debug)]
pub enum LinkEvent {
    /// A station completed the SABM/UA handshake.
    Connected { key: String },
    /// A station disconnected (DISC received, UA for our DISC, or reaped
    /// as stale). Carries the final counters for the connection log.
    Disconnected {
        key: String,
        connection_id: Option<i64>,
        packets_sent: u64,
        packets_received: u64,
    },
    /// Payload bytes arrived for a station.
    Data { key: String, payload: Vec<u8> },
    /// A YAPP transfer reached a terminal state.
    Yapp { key: String, event: YappEvent },
}

/// Connection table + handshake + payload routing for one local station.
pub struct LinkManager {
    tnc: KissTncHandle,
    local_callsign: String,
    #[allow(dead_code)]
    local_ssid: u8,
    /// Active stations, keyed `"CALL-SSID"` (SSID always present).
    connections: HashMap<String, AxConnection>,
    yapp: YappManager,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl LinkManager {
    /// Create a manager for the given local station. Returns the manager and
    /// the event stream the gateway consumes.
    pub fn new(
        tnc: KissTncHandle,
        local_callsign: &str,
        local_ssid: u8,
    ) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tnc,
                local_callsign: local_callsign.to_uppercase(),
                local_ssid,
                connections: HashMap::new(),
                yapp: YappManager::new(),
                events: tx,
            },
            rx,
        )
    }

    fn key_for(frame: &Ax25Frame) -> String {
        format!("{}-{}", frame.source.callsign, frame.source.ssid)
    }

    /// Process one raw frame from the TNC. Malformed frames are dropped (the
    /// link is lossy by design).
    pub async fn handle_frame(&mut self, raw: &[u8]) {
        let frame = match Ax25Frame::decode(raw) {
            Ok(f) => f,
            Err(e) => {
                log::debug!("[ax25] dropping undecodable frame: {}", e);
                return;
            }
        };

        // Only traffic addressed to our station.
        if frame.destination.callsign != self.local_callsign {
            return;
        }

        log::debug!("[ax25] received {}", frame);
        let key = Self::key_for(&frame);

        if frame.is_sabm() {
            self.handle_sabm(&frame, &key).await;
        } else if frame.is_disc() {
            self.handle_disc(&frame, &key).await;
        } else if frame.is_ua() {
            self.handle_ua(&key).await;
        } else if frame.is_ui() {
            self.handle_ui(&frame, &key).await;
        } else {
            self.handle_connected_data(&frame, &key).await;
        }
    }

    async fn handle_sabm(&mut self, frame: &Ax25Frame, key: &str) {
        log::info!("[ax25] connection request from {}", key);

        // Respond as the exact address the caller connected to, so an alias
        // SSID keeps working.
        let conn = self.connections.entry(key.to_string()).or_insert_with(|| {
            AxConnection::new(
                &frame.source.callsign,
                frame.source.ssid,
                &frame.destination.callsign,
                frame.destination.ssid,
            )
        });
        conn.state = ConnectionState::Connected;
        conn.connected_at = Some(chrono::Utc::now());
        conn.touch();

        let ua = Ax25Frame::ua(
            &frame.source.callsign,
            &frame.destination.callsign,
            frame.source.ssid,
            frame.destination.ssid,
        );
        self.transmit(&ua).await;

        let _ = self.events.send(LinkEvent::Connected { key: key.to_string() });
    }

    async fn handle_disc(&mut self, frame: &Ax25Frame, key: &str) {
        log::info!("[ax25] disconnect request from {}", key);

        let ua = Ax25Frame::ua(
            &frame.source.callsign,
            &frame.destination.callsign,
            frame.source.ssid,
            frame.destination.ssid,
        );
        self.transmit(&ua).await;

        if let Some(conn) = self.connections.remove(key) {
            self.yapp.cancel(key);
            let _ = self.events.send(LinkEvent::Disconnected {
                key: key.to_string(),
                connection_id: conn.connection_id,
                packets_sent: conn.packets_sent,
                packets_received: conn.packets_received,
            });
        }
    }

    async fn handle_ua(&mut self, key: &str) {
        // UA closes our own DISC handshake.
        let disconnecting = self
            .connections
            .get(key)
            .map(|c| c.state == ConnectionState::Disconnecting)
            .unwrap_or(false);
        if disconnecting {
            if let Some(conn) = self.connections.remove(key) {
                let _ = self.events.send(LinkEvent::Disconnected {
                    key: key.to_string(),
                    connection_id: conn.connection_id,
                    packets_sent: conn.packets_sent,
                    packets_received: conn.packets_received,
                });
            }
        }
    }

    async fn handle_ui(&mut self, frame: &Ax25Frame, key: &str) {
        // UI frames may arrive without a prior SABM; serve them either way.
        if let Some(conn) = self.connections.get_mut(key) {
            conn.touch();
            conn.packets_received += 1;

            if conn.in_yapp || is_yapp_packet(&frame.info) {
                conn.in_yapp = true;
                self.route_yapp(key, &frame.info).await;
                return;
            }
        }

        if !frame.info.is_empty() {
            let _ = self
                .events
                .send(LinkEvent::Data { key: key.to_string(), payload: frame.info.clone() });
        }
    }

    async fn handle_connected_data(&mut self, frame: &Ax25Frame, key: &str) {
        let Some(conn) = self.connections.get_mut(key) else {
            // No link: tell the peer it is talking into the void.
            let dm = Ax25Frame::dm(
                &frame.source.callsign,
                &frame.destination.callsign,
                frame.source.ssid,
                frame.destination.ssid,
            );
            self.transmit(&dm).await;
            return;
        };

        if conn.state != ConnectionState::Connected {
            return;
        }

        conn.touch();
        conn.packets_received += 1;

        if frame.info.is_empty() {
            return;
        }

        if conn.in_yapp || is_yapp_packet(&frame.info) {
            conn.in_yapp = true;
            self.route_yapp(key, &frame.info).await;
        } else {
            let _ = self
                .events
                .send(LinkEvent::Data { key: key.to_string(), payload: frame.info.clone() });
        }
    }

    async fn route_yapp(&mut self, key: &str, payload: &[u8]) {
        let peer = match self.connections.get(key) {
            Some(c) => c.remote_address(),
            None => key.to_string(),
        };

        let action = self.yapp.handle_packet(&peer, payload);

        if let Some(response) = action.response {
            if let Err(e) = self.send_data(key, &response).await {
                log::warn!("[ax25] failed to send YAPP response to {}: {}", key, e);
            }
        }

        if let Some(event) = action.event {
            if let Some(conn) = self.connections.get_mut(key) {
                conn.in_yapp = false;
            }
            let _ = self.events.send(LinkEvent::Yapp { key: key.to_string(), event });
        }
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Send payload bytes to a connected station as a UI frame.
    pub async fn send_data(&mut self, key: &str, data: &[u8]) -> Ax25Result<()> {
        let conn = self
            .connections
            .get_mut(key)
            .ok_or_else(|| Ax25Error::not_connected(key))?;
        if conn.state != ConnectionState::Connected {
            return Err(Ax25Error::not_connected(key));
        }

        let frame = Ax25Frame::ui(
            &conn.remote_callsign,
            &conn.local_callsign,
            conn.remote_ssid,
            conn.local_ssid,
            data.to_vec(),
        );
        self.tnc
            .send_frame(&frame.encode())
            .await
            .map_err(|e| Ax25Error::send_failed(e.to_string()))?;
        conn.packets_sent += 1;
        conn.touch();
        Ok(())
    }

    /// Request disconnection from a station. The table entry drops on the
    /// peer's UA, or at the latest when the sweeper reaps it.
    pub async fn disconnect(&mut self, key: &str) {
        let Some(conn) = self.connections.get_mut(key) else {
            return;
        };
        if conn.state == ConnectionState::Disconnected {
            return;
        }

        let disc = Ax25Frame::disc(
            &conn.remote_callsign,
            &conn.local_callsign,
            conn.remote_ssid,
            conn.local_ssid,
        );
        conn.state = ConnectionState::Disconnecting;
        self.transmit(&disc).await;
    }

    /// DISC every active station and clear the table (shutdown path).
    pub async fn disconnect_all(&mut self) {
        let keys: Vec<String> = self.connections.keys().cloned().collect();
        for key in keys {
            self.disconnect(&key).await;
        }
        self.connections.clear();
    }

    async fn transmit(&self, frame: &Ax25Frame) {
        log::debug!("[ax25] sending {}", frame);
        if let Err(e) = self.tnc.send_frame(&frame.encode()).await {
            log::error!("[ax25] transmit failed: {}", e);
        }
    }

    // ── YAPP control ────────────────────────────────────────────────

    /// Invite a station to upload a file. Sends the opening ACK.
    pub async fn start_yapp_upload(&mut self, key: &str) -> Ax25Result<()> {
        let peer = self
            .connections
            .get(key)
            .map(|c| c.remote_address())
            .ok_or_else(|| Ax25Error::not_connected(key))?;

        let Some(invite) = self.yapp.start_upload(&peer) else {
            return Err(Ax25Error::send_failed("Transfer already in progress"));
        };
        if let Some(conn) = self.connections.get_mut(key) {
            conn.in_yapp = true;
        }
        self.send_data(key, &invite).await
    }

    /// Push a file to a station. Sends the opening ENQ.
    pub async fn start_yapp_download(
        &mut self,
        key: &str,
        filename: &str,
        data: Vec<u8>,
        mtime: i64,
    ) -> Ax25Result<()> {
        let peer = self
            .connections
            .get(key)
            .map(|c| c.remote_address())
            .ok_or_else(|| Ax25Error::not_connected(key))?;

        let Some(enq) = self.yapp.start_download(&peer, filename, data, mtime) else {
            return Err(Ax25Error::send_failed("Transfer already in progress"));
        };
        if let Some(conn) = self.connections.get_mut(key) {
            conn.in_yapp = true;
        }
        self.send_data(key, &enq).await
    }

    // ── Introspection / maintenance ─────────────────────────────────

    pub fn connection(&self, key: &str) -> Option<&AxConnection> {
        self.connections.get(key)
    }

    pub fn connection_mut(&mut self, key: &str) -> Option<&mut AxConnection> {
        self.connections.get_mut(key)
    }

    pub fn connection_keys(&self) -> Vec<String> {
        self.connections.keys().cloned().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Reap idle stations and timed-out YAPP transfers. Emits Disconnected
    /// for each reaped station.
    pub async fn cleanup_stale(&mut self, timeout: Duration) {
        let stale: Vec<String> = self
            .connections
            .iter()
            .filter(|(_, c)| c.idle_for() > timeout)
            .map(|(k, _)| k.clone())
            .collect();

        for key in stale {
            log::info!("[ax25] removing stale connection {}", key);
            if let Some(conn) = self.connections.remove(&key) {
                let _ = self.events.send(LinkEvent::Disconnected {
                    key,
                    connection_id: conn.connection_id,
                    packets_sent: conn.packets_sent,
                    packets_received: conn.packets_received,
                });
            }
        }

        for peer in self.yapp.cleanup_timeouts() {
            let key = self
                .connections
                .iter_mut()
                .find(|(_, c)| c.remote_address() == peer)
                .map(|(k, c)| {
                    c.in_yapp = false;
                    k.clone()
                });
            if let Some(key) = key {
                let _ = self
                    .events
                    .send(LinkEvent::Yapp {
                        key,
                        event: YappEvent::Failed { reason: "Transfer timed out".to_string() },
                    });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgate_kiss::{KissCodec, KissTnc};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Spin up a loopback "TNC" and return (manager, events, captured-frames
    /// receiver). Frames the manager transmits arrive decoded on the channel.
    async fn test_link() -> (LinkManager, mpsc::UnboundedReceiver<LinkEvent>, mpsc::Receiver<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (wire_tx, wire_rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut codec = KissCodec::new();
            let mut buf = [0u8; 2048];
            loop {
                let n = match sock.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                for frame in codec.decode(&buf[..n]) {
                    if wire_tx.send(frame.payload).await.is_err() {
                        return;
                    }
                }
            }
        });

        let tnc = KissTnc::connect("127.0.0.1", addr.port(), 5).await.unwrap();
        let (link, events) = LinkManager::new(tnc.handle, "W2ASM", 10);
        (link, events, wire_rx)
    }

    async fn next_wire(rx: &mut mpsc::Receiver<Vec<u8>>) -> Ax25Frame {
        let raw = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no frame on the wire")
            .unwrap();
        Ax25Frame::decode(&raw).unwrap()
    }

    #[tokio::test]
    async fn sabm_gets_ua_addressed_from_frame_destination() {
        let (mut link, mut events, mut wire) = test_link().await;

        let sabm = Ax25Frame::sabm("W2ASM", "W1ABC", 10, 0);
        link.handle_frame(&sabm.encode()).await;

        let ua = next_wire(&mut wire).await;
        assert!(ua.is_ua());
        assert_eq!(ua.destination.callsign, "W1ABC");
        assert_eq!(ua.source.callsign, "W2ASM");
        assert_eq!(ua.source.ssid, 10);

        match events.recv().await.unwrap() {
            LinkEvent::Connected { key } => assert_eq!(key, "W1ABC-0"),
            other => panic!("expected Connected, got {:?}", other),
        }
        assert_eq!(link.connection_count(), 1);
    }

    #[tokio::test]
    async fn ui_after_connect_delivers_data() {
        let (mut link, mut events, mut wire) = test_link().await;

        link.handle_frame(&Ax25Frame::sabm("W2ASM", "W1ABC", 10, 0).encode()).await;
        let _ = next_wire(&mut wire).await; // UA
        let _ = events.recv().await; // Connected

        let ui = Ax25Frame::ui("W2ASM", "W1ABC", 10, 0, b"hello\r".to_vec());
        link.handle_frame(&ui.encode()).await;

        match events.recv().await.unwrap() {
            LinkEvent::Data { key, payload } => {
                assert_eq!(key, "W1ABC-0");
                assert_eq!(payload, b"hello\r");
            }
            other => panic!("expected Data, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ui_without_sabm_still_delivers() {
        let (mut link, mut events, _wire) = test_link().await;
        let ui = Ax25Frame::ui("W2ASM", "K0ASM", 10, 0, b"ping".to_vec());
        link.handle_frame(&ui.encode()).await;
        match events.recv().await.unwrap() {
            LinkEvent::Data { key, .. } => assert_eq!(key, "K0ASM-0"),
            other => panic!("expected Data, got {:?}", other),
        }
        // Transient: UI alone does not create a table entry.
        assert_eq!(link.connection_count(), 0);
    }

    #[tokio::test]
    async fn connected_mode_data_without_link_gets_dm() {
        let (mut link, _events, mut wire) = test_link().await;

        // An I frame (control 0x00) from an unknown station.
        let mut frame = Ax25Frame::ui("W2ASM", "W1ABC", 10, 0, b"data".to_vec());
        frame.control = 0x00;
        link.handle_frame(&frame.encode()).await;

        let dm = next_wire(&mut wire).await;
        assert!(dm.is_dm());
        assert_eq!(dm.destination.callsign, "W1ABC");
    }

    #[tokio::test]
    async fn disc_removes_connection_and_acks() {
        let (mut link, mut events, mut wire) = test_link().await;

        link.handle_frame(&Ax25Frame::sabm("W2ASM", "W1ABC", 10, 0).encode()).await;
        let _ = next_wire(&mut wire).await;
        let _ = events.recv().await;

        link.handle_frame(&Ax25Frame::disc("W2ASM", "W1ABC", 10, 0).encode()).await;
        let ua = next_wire(&mut wire).await;
        assert!(ua.is_ua());

        match events.recv().await.unwrap() {
            LinkEvent::Disconnected { key, .. } => assert_eq!(key, "W1ABC-0"),
            other => panic!("expected Disconnected, got {:?}", other),
        }
        assert_eq!(link.connection_count(), 0);
    }

    #[tokio::test]
    async fn our_disc_completes_on_peer_ua() {
        let (mut link, mut events, mut wire) = test_link().await;

        link.handle_frame(&Ax25Frame::sabm("W2ASM", "W1ABC", 10, 0).encode()).await;
        let _ = next_wire(&mut wire).await; // UA
        let _ = events.recv().await; // Connected

        if let Some(conn) = link.connection_mut("W1ABC-0") {
            conn.connection_id = Some(42);
        }

        link.disconnect("W1ABC-0").await;
        let disc = next_wire(&mut wire).await;
        assert!(disc.is_disc());
        assert_eq!(disc.destination.callsign, "W1ABC");
        assert_eq!(
            link.connection("W1ABC-0").unwrap().state,
            ConnectionState::Disconnecting
        );
        // The entry stays until the peer acknowledges.
        assert_eq!(link.connection_count(), 1);

        link.handle_frame(&Ax25Frame::ua("W2ASM", "W1ABC", 10, 0).encode()).await;
        match events.recv().await.unwrap() {
            LinkEvent::Disconnected { key, connection_id, .. } => {
                assert_eq!(key, "W1ABC-0");
                assert_eq!(connection_id, Some(42));
            }
            other => panic!("expected Disconnected, got {:?}", other),
        }
        assert_eq!(link.connection_count(), 0);
    }

    #[tokio::test]
    async fn stray_ua_without_pending_disc_is_ignored() {
        let (mut link, mut events, mut wire) = test_link().await;

        link.handle_frame(&Ax25Frame::sabm("W2ASM", "W1ABC", 10, 0).encode()).await;
        let _ = next_wire(&mut wire).await;
        let _ = events.recv().await;

        // UA arriving while the link is up closes nothing.
        link.handle_frame(&Ax25Frame::ua("W2ASM", "W1ABC", 10, 0).encode()).await;
        assert_eq!(link.connection_count(), 1);
        assert!(
            tokio::time::timeout(Duration::from_millis(200), events.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn frames_for_other_stations_ignored() {
        let (mut link, _events, mut wire) = test_link().await;
        link.handle_frame(&Ax25Frame::sabm("N0DES", "W1ABC", 0, 0).encode()).await;
        assert_eq!(link.connection_count(), 0);
        // Nothing transmitted.
        assert!(
            tokio::time::timeout(Duration::from_millis(200), wire.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn send_data_emits_ui_frame() {
        let (mut link, mut events, mut wire) = test_link().await;
        link.handle_frame(&Ax25Frame::sabm("W2ASM", "W1ABC", 10, 0).encode()).await;
        let _ = next_wire(&mut wire).await;
        let _ = events.recv().await;

        link.send_data("W1ABC-0", b"73 de W2ASM\r").await.unwrap();
        let ui = next_wire(&mut wire).await;
        assert!(ui.is_ui());
        assert_eq!(ui.info, b"73 de W2ASM\r");
        assert_eq!(ui.source.ssid, 10);
    }

    #[tokio::test]
    async fn send_data_to_unknown_station_errors() {
        let (mut link, _events, _wire) = test_link().await;
        let err = link.send_data("NO0NE-0", b"x").await.unwrap_err();
        assert_eq!(err.kind, crate::ax25::types::Ax25ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn yapp_enq_enters_transfer_mode() {
        let (mut link, mut events, mut wire) = test_link().await;
        link.handle_frame(&Ax25Frame::sabm("W2ASM", "W1ABC", 10, 0).encode()).await;
        let _ = next_wire(&mut wire).await;
        let _ = events.recv().await;

        // Peer opens YAPP with ENQ inside a connected-mode data frame.
        let mut enq = Ax25Frame::ui("W2ASM", "W1ABC", 10, 0, vec![0x05]);
        enq.control = 0x00;
        link.handle_frame(&enq.encode()).await;

        // We answer ACK via UI.
        let ack = next_wire(&mut wire).await;
        assert!(ack.is_ui());
        assert_eq!(ack.info, vec![0x06]);
        assert!(link.connection("W1ABC-0").unwrap().in_yapp);
    }
}
