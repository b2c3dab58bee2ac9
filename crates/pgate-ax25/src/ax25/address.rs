//! AX.25 address field codec.
//!
//! An address is seven bytes on the wire: six callsign characters (space
//! padded, each shifted left one bit) followed by the SSID byte packing the
//! C/R bit, two reserved bits, the SSID, and the last-address flag.

use crate::ax25::types::{Ax25Error, Ax25Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Encoded length of one address field.
pub const ADDRESS_LEN: usize = 7;

/// An AX.25 address: callsign + SSID plus the header control bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ax25Address {
    /// Callsign, upper-case, at most 6 characters (stored unpadded).
    pub callsign: String,
    /// Secondary station identifier, 0-15.
    pub ssid: u8,
    /// Command/response bit.
    pub command_response: bool,
    /// Reserved bits; 0b11 for v2.x compatibility.
    pub reserved_bits: u8,
}

impl Ax25Address {
    pub fn new(callsign: &str, ssid: u8) -> Self {
        Self {
            callsign: callsign.trim().to_uppercase().chars().take(6).collect(),
            ssid: ssid & 0x0F,
            command_response: false,
            reserved_bits: 0x03,
        }
    }

    /// Encode to the 7-byte wire form. `last` marks the end of the address
    /// chain.
    pub fn encode(&self, last: bool) -> [u8; ADDRESS_LEN] {
        let mut out = [0u8; ADDRESS_LEN];
        let padded = format!("{:<6}", self.callsign);
        for (i, ch) in padded.bytes().take(6).enumerate() {
            out[i] = ch << 1;
        }
        out[6] = ((self.command_response as u8) << 7)
            | ((self.reserved_bits & 0x03) << 5)
            | ((self.ssid & 0x0F) << 1)
            | (last as u8);
        out
    }

    /// Decode from 7 wire bytes. Returns the address and whether the
    /// last-address bit was set.
    pub fn decode(data: &[u8]) -> Ax25Result<(Self, bool)> {
        if data.len() < ADDRESS_LEN {
            return Err(Ax25Error::bad_address(format!(
                "Address must be {} bytes, got {}",
                ADDRESS_LEN,
                data.len()
            )));
        }

        let callsign: String = data[..6]
            .iter()
            .map(|&b| (b >> 1) as char)
            .collect::<String>()
            .trim()
            .to_string();

        let ssid_byte = data[6];
        let address = Self {
            callsign,
            ssid: (ssid_byte >> 1) & 0x0F,
            command_response: ssid_byte & 0x80 != 0,
            reserved_bits: (ssid_byte >> 5) & 0x03,
        };
        Ok((address, ssid_byte & 0x01 != 0))
    }
}

impl fmt::Display for Ax25Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ssid > 0 {
            write!(f, "{}-{}", self.callsign, self.ssid)
        } else {
            write!(f, "{}", self.callsign)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_shifts_callsign_chars() {
        let addr = Ax25Address::new("W1AW", 0);
        let enc = addr.encode(false);
        assert_eq!(enc[0], b'W' << 1);
        assert_eq!(enc[1], b'1' << 1);
        assert_eq!(enc[4], b' ' << 1); // space padding
        assert_eq!(enc[5], b' ' << 1);
    }

    #[test]
    fn ssid_byte_packs_bits() {
        let mut addr = Ax25Address::new("W2ASM", 10);
        addr.command_response = true;
        let enc = addr.encode(true);
        // C/R=1, reserved=11, ssid=1010, last=1
        assert_eq!(enc[6], 0b1_11_1010_1);
    }

    #[test]
    fn decode_roundtrip() {
        let addr = Ax25Address::new("k0asm", 7);
        let (dec, last) = Ax25Address::decode(&addr.encode(true)).unwrap();
        assert_eq!(dec.callsign, "K0ASM");
        assert_eq!(dec.ssid, 7);
        assert!(last);
    }

    #[test]
    fn decode_clears_last_bit_when_unset() {
        let addr = Ax25Address::new("W1ABC", 0);
        let (_, last) = Ax25Address::decode(&addr.encode(false)).unwrap();
        assert!(!last);
    }

    #[test]
    fn decode_short_input_errors() {
        assert!(Ax25Address::decode(&[0u8; 3]).is_err());
    }

    #[test]
    fn display_format() {
        assert_eq!(Ax25Address::new("W1AW", 0).to_string(), "W1AW");
        assert_eq!(Ax25Address::new("W2ASM", 10).to_string(), "W2ASM-10");
    }

    #[test]
    fn long_callsign_truncated_to_six() {
        let addr = Ax25Address::new("VERYLONGCALL", 1);
        assert_eq!(addr.callsign, "VERYLO");
    }
}
