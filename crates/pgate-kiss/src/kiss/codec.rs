//! KISS byte-stream codec.
//!
//! Encodes AX.25 frames into KISS wire form and parses an incoming byte
//! stream back into frames. The parser is a state machine that tolerates
//! arbitrary chunking of the TCP stream:
//!  - Hunting: discard bytes until a FEND opens a frame
//!  - Command: the byte after FEND selects port + command
//!  - Data / Escaped: payload accumulation with FESC transposition

use crate::kiss::protocol::{command_byte, KissCommand, FEND, FESC, TFEND, TFESC};

/// A decoded KISS data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KissFrame {
    /// TNC port (high nibble of the command byte).
    pub port: u8,
    /// De-escaped AX.25 frame bytes.
    pub payload: Vec<u8>,
}

/// Parser state.
#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    /// Outside a frame, waiting for FEND.
    Hunting,
    /// Just consumed an opening FEND, waiting for the command byte.
    Command,
    /// Inside frame data for a given command byte.
    Data { cmd: u8 },
    /// Saw FESC inside frame data.
    Escaped { cmd: u8 },
}

/// Stateful KISS codec.
///
/// Feed bytes via [`decode`](KissCodec::decode) and collect [`KissFrame`]s.
/// Non-data command frames (parameter echoes) are parsed and dropped; empty
/// frames (back-to-back FENDs) are skipped silently.
#[derive(Debug)]
pub struct KissCodec {
    state: State,
    buf: Vec<u8>,
}

impl KissCodec {
    pub fn new() -> Self {
        Self { state: State::Hunting, buf: Vec::with_capacity(512) }
    }

    /// Encode an AX.25 frame as a KISS data frame for the given port.
    pub fn encode(port: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 4);
        out.push(FEND);
        out.push(command_byte(port, KissCommand::DataFrame));
        for &b in payload {
            match b {
                FEND => out.extend_from_slice(&[FESC, TFEND]),
                FESC => out.extend_from_slice(&[FESC, TFESC]),
                _ => out.push(b),
            }
        }
        out.push(FEND);
        out
    }

    /// Decode a chunk of bytes from the TNC.
    /// Returns zero or more complete data frames.
    pub fn decode(&mut self, input: &[u8]) -> Vec<KissFrame> {
        let mut frames = Vec::new();

        for &byte in input {
            match std::mem::replace(&mut self.state, State::Hunting) {
                State::Hunting => {
                    if byte == FEND {
                        self.state = State::Command;
                    }
                    // Anything else between frames is line noise; drop it.
                }
                State::Command => {
                    if byte == FEND {
                        // Empty frame, stay ready for the next command byte.
                        self.state = State::Command;
                    } else {
                        self.buf.clear();
                        self.state = State::Data { cmd: byte };
                    }
                }
                State::Data { cmd } => match byte {
                    FEND => {
                        self.finish_frame(cmd, &mut frames);
                        self.state = State::Command;
                    }
                    FESC => {
                        self.state = State::Escaped { cmd };
                    }
                    _ => {
                        self.buf.push(byte);
                        self.state = State::Data { cmd };
                    }
                },
                State::Escaped { cmd } => {
                    match byte {
                        TFEND => self.buf.push(FEND),
                        TFESC => self.buf.push(FESC),
                        FEND => {
                            // Truncated escape at frame end: drop the escape,
                            // close the frame, resynchronize.
                            log::warn!("[kiss] truncated escape at frame end");
                            self.finish_frame(cmd, &mut frames);
                            self.state = State::Command;
                            continue;
                        }
                        other => {
                            // Invalid escape; keep the byte as-is and carry on.
                            log::warn!("[kiss] invalid escape byte 0x{:02x}", other);
                            self.buf.push(other);
                        }
                    }
                    self.state = State::Data { cmd };
                }
            }
        }

        frames
    }

    fn finish_frame(&mut self, cmd: u8, frames: &mut Vec<KissFrame>) {
        if self.buf.is_empty() {
            return;
        }
        let payload = std::mem::take(&mut self.buf);
        let port = (cmd >> 4) & 0x0F;
        match KissCommand::from_byte(cmd & 0x0F) {
            Some(KissCommand::DataFrame) => frames.push(KissFrame { port, payload }),
            other => {
                // Parameter frames are host→TNC only; a TNC echoing one back
                // is unusual but harmless.
                log::debug!("[kiss] dropping non-data frame cmd={:?}", other);
            }
        }
    }

    /// Reset the codec state (e.g. on reconnect).
    pub fn reset(&mut self) {
        self.state = State::Hunting;
        self.buf.clear();
    }
}

impl Default for KissCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<KissFrame> {
        let mut codec = KissCodec::new();
        codec.decode(input)
    }

    // ── Encode ──────────────────────────────────────────────────────

    #[test]
    fn encode_plain_payload() {
        let out = KissCodec::encode(0, b"abc");
        assert_eq!(out, vec![FEND, 0x00, b'a', b'b', b'c', FEND]);
    }

    #[test]
    fn encode_escapes_fend_and_fesc() {
        let out = KissCodec::encode(0, &[FEND, FESC, 0x42]);
        assert_eq!(out, vec![FEND, 0x00, FESC, TFEND, FESC, TFESC, 0x42, FEND]);
    }

    #[test]
    fn encode_sets_port_nibble() {
        let out = KissCodec::encode(3, b"x");
        assert_eq!(out[1], 0x30);
    }

    // ── Decode ──────────────────────────────────────────────────────

    #[test]
    fn decode_simple_frame() {
        let frames = decode_all(&[FEND, 0x00, 1, 2, 3, FEND]);
        assert_eq!(frames, vec![KissFrame { port: 0, payload: vec![1, 2, 3] }]);
    }

    #[test]
    fn decode_skips_leading_noise() {
        let frames = decode_all(&[0xAA, 0xBB, FEND, 0x00, 9, FEND]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, vec![9]);
    }

    #[test]
    fn decode_drops_empty_frames() {
        let frames = decode_all(&[FEND, FEND, FEND, 0x00, 7, FEND]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, vec![7]);
    }

    #[test]
    fn decode_unescapes() {
        let frames = decode_all(&[FEND, 0x00, FESC, TFEND, FESC, TFESC, FEND]);
        assert_eq!(frames[0].payload, vec![FEND, FESC]);
    }

    #[test]
    fn decode_chunked_input() {
        let mut codec = KissCodec::new();
        assert!(codec.decode(&[FEND, 0x00, 1]).is_empty());
        assert!(codec.decode(&[2, 3]).is_empty());
        let frames = codec.decode(&[FEND]);
        assert_eq!(frames[0].payload, vec![1, 2, 3]);
    }

    #[test]
    fn decode_back_to_back_frames() {
        let frames = decode_all(&[FEND, 0x00, 1, FEND, 0x00, 2, FEND]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload, vec![1]);
        assert_eq!(frames[1].payload, vec![2]);
    }

    #[test]
    fn decode_ignores_parameter_frames() {
        // TX_DELAY echo should not surface as a data frame.
        let frames = decode_all(&[FEND, 0x01, 30, FEND, FEND, 0x00, 5, FEND]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, vec![5]);
    }

    #[test]
    fn decode_invalid_escape_keeps_byte() {
        let frames = decode_all(&[FEND, 0x00, FESC, 0x42, FEND]);
        assert_eq!(frames[0].payload, vec![0x42]);
    }

    // ── Round-trip ──────────────────────────────────────────────────

    #[test]
    fn roundtrip_with_special_bytes() {
        let payload: Vec<u8> = vec![0, FEND, 1, FESC, 2, TFEND, TFESC, FEND, FEND];
        let wire = KissCodec::encode(5, &payload);
        let mut codec = KissCodec::new();
        let frames = codec.decode(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].port, 5);
        assert_eq!(frames[0].payload, payload);
    }

    #[test]
    fn roundtrip_all_byte_values() {
        let payload: Vec<u8> = (0..=255).collect();
        let wire = KissCodec::encode(0, &payload);
        let frames = decode_all(&wire);
        assert_eq!(frames[0].payload, payload);
    }
}
