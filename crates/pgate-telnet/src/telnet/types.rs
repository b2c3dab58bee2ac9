//! Telnet server types and error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Snapshot of one inbound telnet connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelnetConnectionInfo {
    /// Current table key: `ip:port` before login, callsign after.
    pub key: String,
    /// Network peer address.
    pub peer_addr: String,
    /// Authenticated callsign, if identity has been established.
    pub callsign: Option<String>,
    /// ISO-8601 connection timestamp.
    pub connected_at: String,
    /// Lines received from the peer.
    pub lines_received: u64,
    /// Writes sent to the peer.
    pub writes_sent: u64,
}

/// Telnet server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelnetError {
    pub kind: TelnetErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TelnetErrorKind {
    /// Could not bind the listen socket.
    BindFailed,
    /// No connection under the given key.
    ConnectionNotFound,
    /// The peer went away.
    Disconnected,
    /// Underlying socket error.
    Io,
    /// Rekey target already exists.
    KeyCollision,
}

pub type TelnetResult<T> = Result<T, TelnetError>;

impl TelnetError {
    pub fn new(kind: TelnetErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn bind_failed(msg: impl Into<String>) -> Self {
        Self::new(TelnetErrorKind::BindFailed, msg)
    }

    pub fn connection_not_found(key: &str) -> Self {
        Self::new(TelnetErrorKind::ConnectionNotFound, format!("Connection '{}' not found", key))
    }

    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::new(TelnetErrorKind::Disconnected, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(TelnetErrorKind::Io, msg)
    }
}

impl fmt::Display for TelnetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TelnetError {}

impl From<std::io::Error> for TelnetError {
    fn from(e: std::io::Error) -> Self {
        Self::new(TelnetErrorKind::Io, e.to_string())
    }
}
