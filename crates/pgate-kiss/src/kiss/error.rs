//! KISS-specific error type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised KISS/TNC error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KissError {
    pub kind: KissErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum KissErrorKind {
    /// TCP connect to the TNC failed.
    ConnectionFailed,
    /// The TNC closed the byte stream.
    Disconnected,
    /// Malformed escape sequence inside a frame.
    ProtocolViolation,
    /// Underlying socket I/O error.
    Io,
    /// Operation timed out.
    Timeout,
}

pub type KissResult<T> = Result<T, KissError>;

impl KissError {
    pub fn new(kind: KissErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::new(KissErrorKind::Disconnected, msg)
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::new(KissErrorKind::ProtocolViolation, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(KissErrorKind::Io, msg)
    }
}

impl fmt::Display for KissError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for KissError {}

impl From<std::io::Error> for KissError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::ConnectionRefused => {
                Self::new(KissErrorKind::ConnectionFailed, e.to_string())
            }
            std::io::ErrorKind::TimedOut => Self::new(KissErrorKind::Timeout, e.to_string()),
            _ => Self::new(KissErrorKind::Io, e.to_string()),
        }
    }
}
