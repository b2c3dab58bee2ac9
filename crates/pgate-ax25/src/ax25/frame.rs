//! AX.25 frame codec (v2.2 header, UI transport).
//!
//! Layout: destination address, source address, up to 7 digipeaters (the
//! last-address bit closes the chain), one control byte, then PID + info for
//! information-bearing frames (I and UI).

use crate::ax25::address::{Ax25Address, ADDRESS_LEN};
use crate::ax25::types::{Ax25Error, Ax25Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Control bytes (P/F bit variants included in the masks) ──────────────

/// UI frame control byte.
pub const CONTROL_UI: u8 = 0x03;
/// SABM with the P bit set.
pub const CONTROL_SABM: u8 = 0x3F;
/// UA with the F bit set.
pub const CONTROL_UA: u8 = 0x73;
/// DISC with the P bit set.
pub const CONTROL_DISC: u8 = 0x53;
/// DM with the F bit set.
pub const CONTROL_DM: u8 = 0x1F;
/// No layer-3 protocol.
pub const PID_NO_L3: u8 = 0xF0;

/// Mask clearing the P/F bit for U-frame comparison.
const U_FRAME_MASK: u8 = 0xEF;

/// Minimum decodable frame: dest(7) + source(7) + control(1). U frames such
/// as SABM carry no PID byte, so 15 bytes is a complete frame.
const MIN_FRAME_LEN: usize = 15;

/// Coarse frame classification from the control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ax25FrameType {
    Information,
    Supervisory,
    Unnumbered,
}

/// A decoded (or to-be-encoded) AX.25 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ax25Frame {
    pub destination: Ax25Address,
    pub source: Ax25Address,
    pub digipeaters: Vec<Ax25Address>,
    pub control: u8,
    pub pid: u8,
    pub info: Vec<u8>,
}

impl Ax25Frame {
    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            ADDRESS_LEN * (2 + self.digipeaters.len()) + 2 + self.info.len(),
        );

        out.extend_from_slice(&self.destination.encode(false));
        out.extend_from_slice(&self.source.encode(self.digipeaters.is_empty()));
        for (i, digi) in self.digipeaters.iter().enumerate() {
            let last = i == self.digipeaters.len() - 1;
            out.extend_from_slice(&digi.encode(last));
        }

        out.push(self.control);
        if self.is_info_frame() {
            out.push(self.pid);
        }
        out.extend_from_slice(&self.info);
        out
    }

    /// Decode from wire bytes.
    pub fn decode(data: &[u8]) -> Ax25Result<Self> {
        if data.len() < MIN_FRAME_LEN {
            return Err(Ax25Error::frame_too_short(data.len()));
        }

        let mut offset = 0;
        let (destination, _) = Ax25Address::decode(&data[offset..offset + ADDRESS_LEN])?;
        offset += ADDRESS_LEN;
        let (source, mut last) = Ax25Address::decode(&data[offset..offset + ADDRESS_LEN])?;
        offset += ADDRESS_LEN;

        let mut digipeaters = Vec::new();
        while !last {
            if offset + ADDRESS_LEN > data.len() {
                break;
            }
            let (digi, digi_last) = Ax25Address::decode(&data[offset..offset + ADDRESS_LEN])?;
            digipeaters.push(digi);
            last = digi_last;
            offset += ADDRESS_LEN;
        }

        if offset >= data.len() {
            return Err(Ax25Error::new(
                crate::ax25::types::Ax25ErrorKind::MissingControl,
                "Address chain ran past the end of the frame",
            ));
        }
        let control = data[offset];
        offset += 1;

        let mut pid = PID_NO_L3;
        let mut info = Vec::new();
        if control & 0x01 == 0 || control == CONTROL_UI {
            if offset < data.len() {
                pid = data[offset];
                offset += 1;
            }
            if offset < data.len() {
                info = data[offset..].to_vec();
            }
        }

        Ok(Self { destination, source, digipeaters, control, pid, info })
    }

    // ── Classification ──────────────────────────────────────────────

    pub fn frame_type(&self) -> Ax25FrameType {
        if self.control & 0x01 == 0 {
            Ax25FrameType::Information
        } else if self.control & 0x02 == 0 {
            Ax25FrameType::Supervisory
        } else {
            Ax25FrameType::Unnumbered
        }
    }

    /// I or UI frames carry a PID and info field.
    pub fn is_info_frame(&self) -> bool {
        self.control & 0x01 == 0 || self.control == CONTROL_UI
    }

    pub fn is_ui(&self) -> bool {
        self.control == CONTROL_UI
    }

    pub fn is_sabm(&self) -> bool {
        self.control & U_FRAME_MASK == 0x2F
    }

    pub fn is_disc(&self) -> bool {
        self.control & U_FRAME_MASK == 0x43
    }

    pub fn is_ua(&self) -> bool {
        self.control & U_FRAME_MASK == 0x63
    }

    pub fn is_dm(&self) -> bool {
        self.control & U_FRAME_MASK == 0x0F
    }

    // ── Constructors ────────────────────────────────────────────────

    fn unnumbered(
        destination: &str,
        source: &str,
        dest_ssid: u8,
        source_ssid: u8,
        control: u8,
        info: Vec<u8>,
    ) -> Self {
        Self {
            destination: Ax25Address::new(destination, dest_ssid),
            source: Ax25Address::new(source, source_ssid),
            digipeaters: Vec::new(),
            control,
            pid: PID_NO_L3,
            info,
        }
    }

    /// Unnumbered information frame carrying a payload.
    pub fn ui(destination: &str, source: &str, dest_ssid: u8, source_ssid: u8, info: Vec<u8>) -> Self {
        Self::unnumbered(destination, source, dest_ssid, source_ssid, CONTROL_UI, info)
    }

    /// Connection request.
    pub fn sabm(destination: &str, source: &str, dest_ssid: u8, source_ssid: u8) -> Self {
        Self::unnumbered(destination, source, dest_ssid, source_ssid, CONTROL_SABM, Vec::new())
    }

    /// Unnumbered acknowledge.
    pub fn ua(destination: &str, source: &str, dest_ssid: u8, source_ssid: u8) -> Self {
        Self::unnumbered(destination, source, dest_ssid, source_ssid, CONTROL_UA, Vec::new())
    }

    /// Disconnect request.
    pub fn disc(destination: &str, source: &str, dest_ssid: u8, source_ssid: u8) -> Self {
        Self::unnumbered(destination, source, dest_ssid, source_ssid, CONTROL_DISC, Vec::new())
    }

    /// Disconnected mode (sent in reply to traffic for an unknown link).
    pub fn dm(destination: &str, source: &str, dest_ssid: u8, source_ssid: u8) -> Self {
        Self::unnumbered(destination, source, dest_ssid, source_ssid, CONTROL_DM, Vec::new())
    }
}

impl fmt::Display for Ax25Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_ui() {
            "UI"
        } else if self.is_sabm() {
            "SABM"
        } else if self.is_disc() {
            "DISC"
        } else if self.is_ua() {
            "UA"
        } else if self.is_dm() {
            "DM"
        } else {
            "?"
        };
        write!(f, "{} -> {} [{}]", self.source, self.destination, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Round-trip ──────────────────────────────────────────────────

    #[test]
    fn ui_roundtrip() {
        let f = Ax25Frame::ui("W1ABC", "W2ASM", 0, 10, b"hello\r".to_vec());
        let dec = Ax25Frame::decode(&f.encode()).unwrap();
        assert_eq!(dec.destination.callsign, "W1ABC");
        assert_eq!(dec.source.callsign, "W2ASM");
        assert_eq!(dec.source.ssid, 10);
        assert_eq!(dec.control, CONTROL_UI);
        assert_eq!(dec.pid, PID_NO_L3);
        assert_eq!(dec.info, b"hello\r");
    }

    #[test]
    fn roundtrip_with_digipeaters() {
        let mut f = Ax25Frame::ui("W1ABC", "W2ASM", 1, 2, b"via digis".to_vec());
        f.digipeaters = vec![Ax25Address::new("WIDE1", 1), Ax25Address::new("WIDE2", 2)];
        let dec = Ax25Frame::decode(&f.encode()).unwrap();
        assert_eq!(dec.digipeaters.len(), 2);
        assert_eq!(dec.digipeaters[0].callsign, "WIDE1");
        assert_eq!(dec.digipeaters[1].ssid, 2);
        assert_eq!(dec.info, b"via digis");
    }

    #[test]
    fn sabm_roundtrip_preserves_type() {
        let f = Ax25Frame::sabm("W2ASM", "W1ABC", 10, 0);
        let dec = Ax25Frame::decode(&f.encode()).unwrap();
        assert!(dec.is_sabm());
        assert!(!dec.is_ui());
        assert!(dec.info.is_empty());
    }

    // ── Classification ──────────────────────────────────────────────

    #[test]
    fn control_byte_classifiers() {
        assert!(Ax25Frame::sabm("A0A", "B0B", 0, 0).is_sabm());
        assert!(Ax25Frame::ua("A0A", "B0B", 0, 0).is_ua());
        assert!(Ax25Frame::disc("A0A", "B0B", 0, 0).is_disc());
        assert!(Ax25Frame::dm("A0A", "B0B", 0, 0).is_dm());
        assert!(Ax25Frame::ui("A0A", "B0B", 0, 0, vec![]).is_ui());
    }

    #[test]
    fn classifiers_ignore_poll_final_bit() {
        // SABM without P: 0x2F, UA without F: 0x63.
        let mut f = Ax25Frame::sabm("A0A", "B0B", 0, 0);
        f.control = 0x2F;
        assert!(f.is_sabm());
        f.control = 0x63;
        assert!(f.is_ua());
    }

    #[test]
    fn frame_type_buckets() {
        let ui = Ax25Frame::ui("A0A", "B0B", 0, 0, vec![]);
        assert_eq!(ui.frame_type(), Ax25FrameType::Unnumbered);

        let mut i = ui.clone();
        i.control = 0x00;
        assert_eq!(i.frame_type(), Ax25FrameType::Information);

        let mut s = ui.clone();
        s.control = 0x01; // RR
        assert_eq!(s.frame_type(), Ax25FrameType::Supervisory);
    }

    // ── Control field encoding details ──────────────────────────────

    #[test]
    fn ua_control_byte_is_0x73() {
        assert_eq!(Ax25Frame::ua("A0A", "B0B", 0, 0).control, 0x73);
    }

    #[test]
    fn non_info_frames_omit_pid() {
        let sabm = Ax25Frame::sabm("W1ABC", "W2ASM", 0, 0);
        // dest(7) + src(7) + control(1); no PID byte for U frames sans info.
        assert_eq!(sabm.encode().len(), 15);

        let ui = Ax25Frame::ui("W1ABC", "W2ASM", 0, 0, vec![]);
        assert_eq!(ui.encode().len(), 16);
    }

    // ── Errors ──────────────────────────────────────────────────────

    #[test]
    fn short_frame_rejected() {
        let err = Ax25Frame::decode(&[0u8; 10]).unwrap_err();
        assert_eq!(err.kind, crate::ax25::types::Ax25ErrorKind::FrameTooShort);
    }

    #[test]
    fn minimal_sabm_decodes() {
        let wire = Ax25Frame::sabm("W2ASM", "W1ABC", 10, 0).encode();
        assert_eq!(wire.len(), 15);
        let dec = Ax25Frame::decode(&wire).unwrap();
        assert!(dec.is_sabm());
        assert_eq!(dec.destination.ssid, 10);
    }
}
