//! Async KISS TNC client (Direwolf or any KISS-over-TCP modem).
//!
//! Connects to the TNC, spawns a read loop that decodes KISS frames and
//! forwards the de-framed AX.25 payloads over an mpsc channel, and exposes a
//! cloneable handle for transmitting frames and parameter commands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

use crate::kiss::codec::KissCodec;
use crate::kiss::error::KissError;
use crate::kiss::protocol::{parameter_frame, KissCommand};

/// Write-side handle to a connected TNC. Cheap to clone.
#[derive(Clone)]
pub struct KissTncHandle {
    writer: Arc<Mutex<tokio::net::tcp::OwnedWriteHalf>>,
    connected: Arc<AtomicBool>,
    port: u8,
}

impl KissTncHandle {
    /// Whether the TNC byte stream is still up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Transmit one AX.25 frame, KISS-framed.
    pub async fn send_frame(&self, frame: &[u8]) -> Result<(), KissError> {
        if !self.is_connected() {
            return Err(KissError::disconnected("Not connected to KISS TNC"));
        }
        let wire = KissCodec::encode(self.port, frame);
        let mut writer = self.writer.lock().await;
        writer.write_all(&wire).await.map_err(|e| {
            self.connected.store(false, Ordering::Relaxed);
            KissError::from(e)
        })?;
        log::debug!("[kiss] sent frame ({} bytes)", frame.len());
        Ok(())
    }

    /// Set TX delay (10 ms units). Write-only; the TNC does not reply.
    pub async fn set_tx_delay(&self, delay: u8) -> Result<(), KissError> {
        self.send_parameter(KissCommand::TxDelay, delay).await
    }

    /// Set CSMA persistence (0-255).
    pub async fn set_persistence(&self, persistence: u8) -> Result<(), KissError> {
        self.send_parameter(KissCommand::Persistence, persistence).await
    }

    /// Set CSMA slot time (10 ms units).
    pub async fn set_slot_time(&self, slot_time: u8) -> Result<(), KissError> {
        self.send_parameter(KissCommand::SlotTime, slot_time).await
    }

    async fn send_parameter(&self, command: KissCommand, value: u8) -> Result<(), KissError> {
        if !self.is_connected() {
            return Err(KissError::disconnected("Not connected to KISS TNC"));
        }
        let wire = parameter_frame(self.port, command, value);
        let mut writer = self.writer.lock().await;
        writer.write_all(&wire).await.map_err(KissError::from)
    }

    /// Mark the link down. The read loop exits on its next wakeup.
    pub fn shutdown(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }
}

/// Connected TNC: the write handle plus the receive side of the frame channel.
pub struct KissTnc {
    pub handle: KissTncHandle,
    /// De-framed AX.25 payloads as they arrive from the air.
    pub frames: mpsc::Receiver<Vec<u8>>,
}

impl KissTnc {
    /// Connect to a KISS TNC and spawn the read loop.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout_secs: u64,
    ) -> Result<Self, KissError> {
        let addr = format!("{}:{}", host, port);
        log::info!("[kiss] connecting to TNC at {}", addr);

        let stream = timeout(Duration::from_secs(connect_timeout_secs), TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                KissError::new(
                    crate::kiss::error::KissErrorKind::Timeout,
                    format!("Connection to {} timed out after {}s", addr, connect_timeout_secs),
                )
            })?
            .map_err(KissError::from)?;

        log::info!("[kiss] connected to TNC at {}", addr);

        let (read_half, write_half) = stream.into_split();
        let connected = Arc::new(AtomicBool::new(true));
        let (frame_tx, frame_rx) = mpsc::channel::<Vec<u8>>(256);

        let read_connected = connected.clone();
        tokio::spawn(async move {
            read_loop(read_half, frame_tx, read_connected).await;
        });

        Ok(Self {
            handle: KissTncHandle {
                writer: Arc::new(Mutex::new(write_half)),
                connected,
                port: 0,
            },
            frames: frame_rx,
        })
    }
}

async fn read_loop(
    mut reader: tokio::net::tcp::OwnedReadHalf,
    frame_tx: mpsc::Sender<Vec<u8>>,
    connected: Arc<AtomicBool>,
) {
    let mut codec = KissCodec::new();
    let mut buf = [0u8; 4096];

    loop {
        if !connected.load(Ordering::Relaxed) {
            break;
        }

        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                log::info!("[kiss] TNC closed the connection");
                connected.store(false, Ordering::Relaxed);
                break;
            }
            Ok(n) => n,
            Err(e) => {
                log::error!("[kiss] read error: {}", e);
                connected.store(false, Ordering::Relaxed);
                break;
            }
        };

        for frame in codec.decode(&buf[..n]) {
            log::debug!("[kiss] received frame ({} bytes)", frame.payload.len());
            if frame_tx.send(frame.payload).await.is_err() {
                // Receiver dropped: the gateway is shutting down.
                connected.store(false, Ordering::Relaxed);
                break;
            }
        }
    }

    log::info!("[kiss] read loop exited");
}
