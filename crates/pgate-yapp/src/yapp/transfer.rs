//! Single YAPP transfer state machine.
//!
//! Half-duplex and lock-step: every packet we receive produces at most one
//! response packet, and the peer is expected to wait for it. The machine does
//! no I/O; the link layer feeds packets in and transmits whatever comes out.

use std::time::{Duration, Instant};

use crate::yapp::types::{YappHeader, ACK, BLOCK_SIZE, CAN, ENQ, EOT, ETX, HEADER_SIZE, NAK, SOH, STX};

const MAX_RETRIES: u32 = 3;
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Transfer states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YappState {
    Idle,
    WaitAck,
    RecvHeader,
    SendHeader,
    RecvData,
    SendData,
    Complete,
    Error,
}

/// Terminal outcome surfaced to the link layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YappEvent {
    /// We received a complete file from the peer.
    UploadComplete { filename: String, data: Vec<u8> },
    /// The peer acknowledged our last block and we closed with ETX.
    DownloadComplete { filename: String },
    /// Transfer aborted (cancelled, retries exhausted, bad header).
    Failed { reason: String },
}

/// What to do after feeding a packet in: transmit `response` (if any) and
/// surface `event` (if the transfer just terminated).
#[derive(Debug, Clone, Default)]
pub struct YappAction {
    pub response: Option<Vec<u8>>,
    pub event: Option<YappEvent>,
}

impl YappAction {
    fn respond(bytes: Vec<u8>) -> Self {
        Self { response: Some(bytes), event: None }
    }

    fn none() -> Self {
        Self::default()
    }
}

/// A single upload (peer → us) or download (us → peer).
#[derive(Debug)]
pub struct YappTransfer {
    pub is_upload: bool,
    pub peer: String,
    pub state: YappState,
    header: Option<YappHeader>,
    buf: Vec<u8>,
    current_block: usize,
    total_blocks: usize,
    last_activity: Instant,
    retries: u32,
}

impl YappTransfer {
    pub fn new(is_upload: bool, peer: impl Into<String>) -> Self {
        Self {
            is_upload,
            peer: peer.into(),
            state: YappState::Idle,
            header: None,
            buf: Vec::new(),
            current_block: 0,
            total_blocks: 0,
            last_activity: Instant::now(),
            retries: 0,
        }
    }

    /// Begin receiving a file. Returns the ACK that invites the header.
    pub fn start_upload(&mut self) -> Vec<u8> {
        log::info!("[yapp:{}] starting upload", self.peer);
        self.state = YappState::WaitAck;
        self.last_activity = Instant::now();
        vec![ACK]
    }

    /// Begin sending a file. Returns the opening ENQ.
    pub fn start_download(&mut self, filename: &str, data: Vec<u8>, mtime: i64) -> Vec<u8> {
        log::info!("[yapp:{}] starting download: {} ({} bytes)", self.peer, filename, data.len());
        self.header = Some(YappHeader::new(filename, data.len(), mtime));
        self.total_blocks = data.len().div_ceil(BLOCK_SIZE);
        self.current_block = 0;
        self.buf = data;
        self.state = YappState::WaitAck;
        self.last_activity = Instant::now();
        vec![ENQ]
    }

    /// Feed one inbound packet through the state machine.
    pub fn handle_packet(&mut self, data: &[u8]) -> YappAction {
        self.last_activity = Instant::now();

        let Some(&control) = data.first() else {
            return YappAction::none();
        };

        // CAN aborts regardless of state.
        if control == CAN {
            return self.fail("Transfer cancelled by remote station", None);
        }

        match self.state {
            YappState::WaitAck => self.on_wait_ack(control),
            YappState::RecvHeader => self.on_recv_header(control, data),
            YappState::RecvData => self.on_recv_data(control, data),
            YappState::SendHeader => self.on_send_header_reply(control),
            YappState::SendData => self.on_send_data_reply(control),
            YappState::Idle | YappState::Complete | YappState::Error => YappAction::none(),
        }
    }

    fn on_wait_ack(&mut self, control: u8) -> YappAction {
        match control {
            ACK => {
                if self.is_upload {
                    // Receiving: the peer is about to send the header.
                    self.state = YappState::RecvHeader;
                    YappAction::none()
                } else {
                    self.state = YappState::SendHeader;
                    YappAction::respond(self.header_packet())
                }
            }
            NAK => self.handle_nak(),
            ENQ if self.is_upload => {
                // Peer repeated its ENQ before seeing our ACK; re-invite.
                YappAction::respond(vec![ACK])
            }
            _ => YappAction::none(),
        }
    }

    fn on_recv_header(&mut self, control: u8, data: &[u8]) -> YappAction {
        if control != SOH {
            return YappAction::none();
        }
        if data.len() < 1 + HEADER_SIZE {
            log::warn!("[yapp:{}] short header packet ({} bytes)", self.peer, data.len());
            return YappAction::respond(vec![NAK]);
        }

        match YappHeader::decode(&data[1..1 + HEADER_SIZE]) {
            Some(header) => {
                log::info!(
                    "[yapp:{}] header: {} ({} bytes)",
                    self.peer, header.filename, header.file_size
                );
                self.total_blocks = header.file_size.div_ceil(BLOCK_SIZE);
                self.header = Some(header);
                self.state = YappState::RecvData;
                YappAction::respond(vec![ACK])
            }
            None => {
                log::warn!("[yapp:{}] undecodable header", self.peer);
                YappAction::respond(vec![NAK])
            }
        }
    }

    fn on_recv_data(&mut self, control: u8, data: &[u8]) -> YappAction {
        let expected = self.header.as_ref().map(|h| h.file_size).unwrap_or(0);

        match control {
            STX if data.len() >= 2 => {
                self.buf.extend_from_slice(&data[1..]);
                self.current_block += 1;

                if self.buf.len() >= expected {
                    // Trailing block padding past the declared size is dropped.
                    self.buf.truncate(expected);
                    self.state = YappState::Complete;
                    log::info!("[yapp:{}] upload complete ({} bytes)", self.peer, self.buf.len());
                    let filename = self
                        .header
                        .as_ref()
                        .map(|h| h.filename.clone())
                        .unwrap_or_else(|| "unknown.dat".to_string());
                    return YappAction {
                        response: Some(vec![ACK]),
                        event: Some(YappEvent::UploadComplete {
                            filename,
                            data: std::mem::take(&mut self.buf),
                        }),
                    };
                }
                YappAction::respond(vec![ACK])
            }
            ETX => {
                if self.buf.len() >= expected {
                    self.state = YappState::Complete;
                    YappAction::respond(vec![ACK])
                } else {
                    log::warn!(
                        "[yapp:{}] ETX with incomplete file: {}/{}",
                        self.peer, self.buf.len(), expected
                    );
                    YappAction::respond(vec![NAK])
                }
            }
            EOT => {
                self.state = YappState::Complete;
                YappAction::respond(vec![ACK])
            }
            _ => YappAction::none(),
        }
    }

    fn on_send_header_reply(&mut self, control: u8) -> YappAction {
        match control {
            ACK => {
                self.retries = 0;
                self.state = YappState::SendData;
                self.next_block_action()
            }
            NAK => self.handle_nak(),
            _ => YappAction::none(),
        }
    }

    fn on_send_data_reply(&mut self, control: u8) -> YappAction {
        match control {
            ACK => {
                self.retries = 0;
                self.current_block += 1;
                self.next_block_action()
            }
            NAK => self.handle_nak(),
            _ => YappAction::none(),
        }
    }

    /// Send the current block, or ETX + completion once all blocks are out.
    fn next_block_action(&mut self) -> YappAction {
        if self.current_block >= self.total_blocks {
            self.state = YappState::Complete;
            log::info!("[yapp:{}] all blocks sent, transfer complete", self.peer);
            let filename = self
                .header
                .as_ref()
                .map(|h| h.filename.clone())
                .unwrap_or_default();
            return YappAction {
                response: Some(vec![ETX]),
                event: Some(YappEvent::DownloadComplete { filename }),
            };
        }

        let start = self.current_block * BLOCK_SIZE;
        let end = (start + BLOCK_SIZE).min(self.buf.len());
        let mut packet = Vec::with_capacity(1 + BLOCK_SIZE);
        packet.push(STX);
        packet.extend_from_slice(&self.buf[start..end]);
        packet.resize(1 + BLOCK_SIZE, 0);

        log::debug!(
            "[yapp:{}] sending block {}/{}",
            self.peer,
            self.current_block + 1,
            self.total_blocks
        );
        YappAction::respond(packet)
    }

    /// Retry the current unit, or abort after the retry budget is spent.
    fn handle_nak(&mut self) -> YappAction {
        self.retries += 1;
        if self.retries >= MAX_RETRIES {
            log::error!("[yapp:{}] max retries exceeded", self.peer);
            return self.fail("Max retries exceeded", Some(vec![CAN]));
        }

        log::warn!("[yapp:{}] NAK, retry {}/{}", self.peer, self.retries, MAX_RETRIES);
        match self.state {
            YappState::SendHeader => YappAction::respond(self.header_packet()),
            YappState::SendData => {
                // Retransmit the block the peer just refused.
                let mut action = self.next_block_action();
                // next_block_action does not advance the cursor on its own,
                // so a plain re-issue is the retransmission.
                if action.event.is_some() {
                    action.response = Some(vec![ETX]);
                }
                action
            }
            _ => YappAction::none(),
        }
    }

    fn fail(&mut self, reason: &str, response: Option<Vec<u8>>) -> YappAction {
        log::warn!("[yapp:{}] transfer failed: {}", self.peer, reason);
        self.state = YappState::Error;
        YappAction { response, event: Some(YappEvent::Failed { reason: reason.to_string() }) }
    }

    fn header_packet(&self) -> Vec<u8> {
        let mut packet = vec![SOH];
        if let Some(header) = &self.header {
            packet.extend_from_slice(&header.encode());
        }
        packet
    }

    /// Abort locally; the returned CAN must be transmitted to the peer.
    pub fn cancel(&mut self) -> Vec<u8> {
        log::info!("[yapp:{}] cancelling transfer", self.peer);
        self.state = YappState::Error;
        vec![CAN]
    }

    pub fn is_complete(&self) -> bool {
        self.state == YappState::Complete
    }

    pub fn is_error(&self) -> bool {
        self.state == YappState::Error
    }

    pub fn is_timed_out(&self) -> bool {
        self.last_activity.elapsed() > INACTIVITY_TIMEOUT
    }

    /// (blocks transferred, total blocks)
    pub fn progress(&self) -> (usize, usize) {
        (self.current_block, self.total_blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_packet(filename: &str, size: usize) -> Vec<u8> {
        let mut p = vec![SOH];
        p.extend_from_slice(&YappHeader::new(filename, size, 0).encode());
        p
    }

    fn block_packet(data: &[u8]) -> Vec<u8> {
        let mut p = vec![STX];
        p.extend_from_slice(data);
        p.resize(1 + BLOCK_SIZE, 0);
        p
    }

    // ── Upload (we receive) ─────────────────────────────────────────

    #[test]
    fn upload_happy_path() {
        let mut t = YappTransfer::new(true, "W1ABC");
        assert_eq!(t.start_upload(), vec![ACK]);

        // Peer's ACK moves us to header reception with no reply.
        let a = t.handle_packet(&[ACK]);
        assert!(a.response.is_none());
        assert_eq!(t.state, YappState::RecvHeader);

        let a = t.handle_packet(&header_packet("test.txt", 5));
        assert_eq!(a.response, Some(vec![ACK]));
        assert_eq!(t.state, YappState::RecvData);

        let a = t.handle_packet(&block_packet(b"hello"));
        assert_eq!(a.response, Some(vec![ACK]));
        match a.event {
            Some(YappEvent::UploadComplete { filename, data }) => {
                assert_eq!(filename, "test.txt");
                assert_eq!(data, b"hello");
            }
            other => panic!("expected UploadComplete, got {:?}", other),
        }
        assert!(t.is_complete());
    }

    #[test]
    fn upload_truncates_to_declared_size() {
        let mut t = YappTransfer::new(true, "W1ABC");
        t.start_upload();
        t.handle_packet(&[ACK]);
        t.handle_packet(&header_packet("x.bin", 130));

        let a1 = t.handle_packet(&block_packet(&[7u8; BLOCK_SIZE]));
        assert_eq!(a1.response, Some(vec![ACK]));
        assert!(a1.event.is_none());

        let a2 = t.handle_packet(&block_packet(&[9u8; 2]));
        match a2.event {
            Some(YappEvent::UploadComplete { data, .. }) => {
                assert_eq!(data.len(), 130);
                assert_eq!(&data[128..], &[9, 9]);
            }
            other => panic!("expected UploadComplete, got {:?}", other),
        }
    }

    #[test]
    fn upload_early_etx_naks() {
        let mut t = YappTransfer::new(true, "W1ABC");
        t.start_upload();
        t.handle_packet(&[ACK]);
        t.handle_packet(&header_packet("x.bin", 200));
        let a = t.handle_packet(&[ETX]);
        assert_eq!(a.response, Some(vec![NAK]));
    }

    #[test]
    fn upload_bad_header_naks() {
        let mut t = YappTransfer::new(true, "W1ABC");
        t.start_upload();
        t.handle_packet(&[ACK]);
        let mut bad = vec![SOH];
        bad.extend_from_slice(&[0u8; HEADER_SIZE]);
        let a = t.handle_packet(&bad);
        assert_eq!(a.response, Some(vec![NAK]));
    }

    #[test]
    fn cancel_from_peer_fails_transfer() {
        let mut t = YappTransfer::new(true, "W1ABC");
        t.start_upload();
        let a = t.handle_packet(&[CAN]);
        assert!(matches!(a.event, Some(YappEvent::Failed { .. })));
        assert!(t.is_error());
    }

    // ── Download (we send) ──────────────────────────────────────────

    #[test]
    fn download_happy_path() {
        let mut t = YappTransfer::new(false, "W1ABC");
        let data = b"hello world".to_vec();
        assert_eq!(t.start_download("greet.txt", data.clone(), 0), vec![ENQ]);

        // Peer ACKs our ENQ: header goes out.
        let a = t.handle_packet(&[ACK]);
        let header = a.response.unwrap();
        assert_eq!(header[0], SOH);
        assert_eq!(header.len(), 1 + HEADER_SIZE);

        // Peer ACKs the header: first (only) block goes out, NUL-padded.
        let a = t.handle_packet(&[ACK]);
        let block = a.response.unwrap();
        assert_eq!(block[0], STX);
        assert_eq!(block.len(), 1 + BLOCK_SIZE);
        assert_eq!(&block[1..12], b"hello world");
        assert_eq!(block[12], 0);

        // Peer ACKs the block: ETX + completion.
        let a = t.handle_packet(&[ACK]);
        assert_eq!(a.response, Some(vec![ETX]));
        assert!(matches!(a.event, Some(YappEvent::DownloadComplete { .. })));
    }

    #[test]
    fn download_multi_block() {
        let mut t = YappTransfer::new(false, "W1ABC");
        let data = vec![0xAB; BLOCK_SIZE + 10];
        t.start_download("two.bin", data, 0);
        t.handle_packet(&[ACK]); // header out
        let b1 = t.handle_packet(&[ACK]).response.unwrap();
        assert_eq!(&b1[1..], &[0xAB; BLOCK_SIZE][..]);
        let b2 = t.handle_packet(&[ACK]).response.unwrap();
        assert_eq!(&b2[1..11], &[0xAB; 10][..]);
        assert_eq!(b2[11], 0);
        let fin = t.handle_packet(&[ACK]);
        assert_eq!(fin.response, Some(vec![ETX]));
    }

    #[test]
    fn download_nak_retransmits_then_cancels() {
        let mut t = YappTransfer::new(false, "W1ABC");
        t.start_download("f.bin", vec![1; 10], 0);
        t.handle_packet(&[ACK]); // header
        t.handle_packet(&[ACK]); // block 0

        let r1 = t.handle_packet(&[NAK]).response.unwrap();
        assert_eq!(r1[0], STX);
        let r2 = t.handle_packet(&[NAK]).response.unwrap();
        assert_eq!(r2[0], STX);

        // Third consecutive NAK exhausts the retry budget.
        let a = t.handle_packet(&[NAK]);
        assert_eq!(a.response, Some(vec![CAN]));
        assert!(matches!(a.event, Some(YappEvent::Failed { .. })));
        assert!(t.is_error());
    }

    #[test]
    fn local_cancel_emits_can() {
        let mut t = YappTransfer::new(false, "W1ABC");
        t.start_download("f.bin", vec![1; 10], 0);
        assert_eq!(t.cancel(), vec![CAN]);
        assert!(t.is_error());
    }
}
