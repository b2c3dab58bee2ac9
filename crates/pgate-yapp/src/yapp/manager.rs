//! Per-peer YAPP transfer bookkeeping.
//!
//! One transfer per remote callsign at a time. An unsolicited ENQ from a peer
//! with no active transfer implicitly opens an upload.

use std::collections::HashMap;

use crate::yapp::transfer::{YappAction, YappTransfer};
use crate::yapp::types::ENQ;

/// Manages YAPP transfers for multiple connections, keyed by the remote
/// station's decorated callsign.
#[derive(Debug, Default)]
pub struct YappManager {
    transfers: HashMap<String, YappTransfer>,
}

impl YappManager {
    pub fn new() -> Self {
        Self { transfers: HashMap::new() }
    }

    /// Begin receiving a file from `peer`. Returns the invite packet, or
    /// `None` if a transfer is already running for that peer.
    pub fn start_upload(&mut self, peer: &str) -> Option<Vec<u8>> {
        if self.transfers.contains_key(peer) {
            log::warn!("[yapp] transfer already in progress for {}", peer);
            return None;
        }
        let mut transfer = YappTransfer::new(true, peer);
        let response = transfer.start_upload();
        self.transfers.insert(peer.to_string(), transfer);
        Some(response)
    }

    /// Begin sending a file to `peer`. Returns the opening ENQ, or `None` if
    /// a transfer is already running for that peer.
    pub fn start_download(
        &mut self,
        peer: &str,
        filename: &str,
        data: Vec<u8>,
        mtime: i64,
    ) -> Option<Vec<u8>> {
        if self.transfers.contains_key(peer) {
            log::warn!("[yapp] transfer already in progress for {}", peer);
            return None;
        }
        let mut transfer = YappTransfer::new(false, peer);
        let response = transfer.start_download(filename, data, mtime);
        self.transfers.insert(peer.to_string(), transfer);
        Some(response)
    }

    /// Route an inbound packet to the peer's transfer. Terminal transfers are
    /// removed after their action (with the terminal event attached) is
    /// returned, so the caller sees each outcome exactly once.
    pub fn handle_packet(&mut self, peer: &str, data: &[u8]) -> YappAction {
        let transfer = match self.transfers.get_mut(peer) {
            Some(t) => t,
            None => {
                if data.first() == Some(&ENQ) {
                    log::info!("[yapp] unsolicited ENQ from {}, starting upload", peer);
                    return YappAction { response: self.start_upload(peer), event: None };
                }
                return YappAction::default();
            }
        };

        let action = transfer.handle_packet(data);
        if transfer.is_complete() || transfer.is_error() {
            self.transfers.remove(peer);
        }
        action
    }

    pub fn has_transfer(&self, peer: &str) -> bool {
        self.transfers.contains_key(peer)
    }

    /// Locally cancel a transfer. Returns the CAN to transmit.
    pub fn cancel(&mut self, peer: &str) -> Option<Vec<u8>> {
        self.transfers.remove(peer).map(|mut t| t.cancel())
    }

    /// Drop transfers with no activity for the protocol timeout. Returns the
    /// affected peers so the link layer can notify them.
    pub fn cleanup_timeouts(&mut self) -> Vec<String> {
        let stale: Vec<String> = self
            .transfers
            .iter()
            .filter(|(_, t)| t.is_timed_out())
            .map(|(peer, _)| peer.clone())
            .collect();

        for peer in &stale {
            log::warn!("[yapp] transfer with {} timed out", peer);
            self.transfers.remove(peer);
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yapp::transfer::YappEvent;
    use crate::yapp::types::{YappHeader, ACK, BLOCK_SIZE, SOH, STX};

    #[test]
    fn unsolicited_enq_starts_upload() {
        let mut mgr = YappManager::new();
        let action = mgr.handle_packet("W1ABC", &[ENQ]);
        assert_eq!(action.response, Some(vec![ACK]));
        assert!(mgr.has_transfer("W1ABC"));
    }

    #[test]
    fn second_transfer_for_same_peer_rejected() {
        let mut mgr = YappManager::new();
        assert!(mgr.start_upload("W1ABC").is_some());
        assert!(mgr.start_upload("W1ABC").is_none());
        assert!(mgr.start_download("W1ABC", "f", vec![], 0).is_none());
    }

    #[test]
    fn completed_transfer_is_removed() {
        let mut mgr = YappManager::new();
        mgr.start_upload("W1ABC");
        mgr.handle_packet("W1ABC", &[ACK]);

        let mut hdr = vec![SOH];
        hdr.extend_from_slice(&YappHeader::new("t.txt", 2, 0).encode());
        mgr.handle_packet("W1ABC", &hdr);

        let mut block = vec![STX];
        block.extend_from_slice(b"ab");
        block.resize(1 + BLOCK_SIZE, 0);
        let action = mgr.handle_packet("W1ABC", &block);

        assert!(matches!(action.event, Some(YappEvent::UploadComplete { .. })));
        assert!(!mgr.has_transfer("W1ABC"));
    }

    #[test]
    fn transfers_are_independent_per_peer() {
        let mut mgr = YappManager::new();
        mgr.start_upload("W1ABC");
        mgr.start_upload("K0ASM");
        assert!(mgr.has_transfer("W1ABC"));
        assert!(mgr.has_transfer("K0ASM"));
        mgr.cancel("W1ABC");
        assert!(!mgr.has_transfer("W1ABC"));
        assert!(mgr.has_transfer("K0ASM"));
    }

    #[test]
    fn stray_packet_without_transfer_is_ignored() {
        let mut mgr = YappManager::new();
        let action = mgr.handle_packet("W1ABC", &[STX, 1, 2, 3]);
        assert!(action.response.is_none());
        assert!(action.event.is_none());
        assert!(!mgr.has_transfer("W1ABC"));
    }
}
