//! AX.25 error and connection types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

// ── Error type ──────────────────────────────────────────────────────────

/// Categorised AX.25 error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ax25Error {
    pub kind: Ax25ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Ax25ErrorKind {
    /// Frame shorter than the 16-byte minimum.
    FrameTooShort,
    /// Address field could not be decoded.
    BadAddress,
    /// Address chain ended without a control field.
    MissingControl,
    /// Operation against a station that is not connected.
    NotConnected,
    /// The KISS link refused the frame.
    SendFailed,
}

pub type Ax25Result<T> = Result<T, Ax25Error>;

impl Ax25Error {
    pub fn new(kind: Ax25ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn frame_too_short(len: usize) -> Self {
        Self::new(Ax25ErrorKind::FrameTooShort, format!("Frame too short ({} bytes)", len))
    }

    pub fn bad_address(msg: impl Into<String>) -> Self {
        Self::new(Ax25ErrorKind::BadAddress, msg)
    }

    pub fn not_connected(key: &str) -> Self {
        Self::new(Ax25ErrorKind::NotConnected, format!("{} is not connected", key))
    }

    pub fn send_failed(msg: impl Into<String>) -> Self {
        Self::new(Ax25ErrorKind::SendFailed, msg)
    }
}

impl fmt::Display for Ax25Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Ax25Error {}

// ── Connection state ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        };
        write!(f, "{}", s)
    }
}

/// One AX.25 station we are (or were) talking to.
#[derive(Debug)]
pub struct AxConnection {
    pub remote_callsign: String,
    pub remote_ssid: u8,
    pub local_callsign: String,
    pub local_ssid: u8,
    pub state: ConnectionState,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_activity: Instant,
    pub packets_sent: u64,
    pub packets_received: u64,
    /// All inbound payloads route to the YAPP transfer while set.
    pub in_yapp: bool,
    /// Row id from the connection log, set by the gateway.
    pub connection_id: Option<i64>,
}

impl AxConnection {
    pub fn new(remote_callsign: &str, remote_ssid: u8, local_callsign: &str, local_ssid: u8) -> Self {
        Self {
            remote_callsign: remote_callsign.to_uppercase(),
            remote_ssid,
            local_callsign: local_callsign.to_uppercase(),
            local_ssid,
            state: ConnectionState::Disconnected,
            connected_at: None,
            last_activity: Instant::now(),
            packets_sent: 0,
            packets_received: 0,
            in_yapp: false,
            connection_id: None,
        }
    }

    /// Remote address string, SSID omitted when zero.
    pub fn remote_address(&self) -> String {
        pgate_core::format_callsign(&self.remote_callsign, self.remote_ssid)
    }

    /// Local address string, SSID omitted when zero.
    pub fn local_address(&self) -> String {
        pgate_core::format_callsign(&self.local_callsign, self.local_ssid)
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity.elapsed()
    }
}

impl fmt::Display for AxConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.remote_address(), self.state)
    }
}
