//! KISS protocol constants (host ↔ TNC framing).

/// Frame End.
pub const FEND: u8 = 0xC0;
/// Frame Escape.
pub const FESC: u8 = 0xDB;
/// Transposed Frame End (follows FESC).
pub const TFEND: u8 = 0xDC;
/// Transposed Frame Escape (follows FESC).
pub const TFESC: u8 = 0xDD;

/// KISS command codes carried in the low nibble of the command byte; the high
/// nibble selects the TNC port (0-15).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KissCommand {
    DataFrame = 0x00,
    TxDelay = 0x01,
    Persistence = 0x02,
    SlotTime = 0x03,
    TxTail = 0x04,
    FullDuplex = 0x05,
    SetHardware = 0x06,
    Return = 0xFF,
}

impl KissCommand {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::DataFrame),
            0x01 => Some(Self::TxDelay),
            0x02 => Some(Self::Persistence),
            0x03 => Some(Self::SlotTime),
            0x04 => Some(Self::TxTail),
            0x05 => Some(Self::FullDuplex),
            0x06 => Some(Self::SetHardware),
            0xFF => Some(Self::Return),
            _ => None,
        }
    }
}

/// Build the command byte for a port/command pair.
pub fn command_byte(port: u8, command: KissCommand) -> u8 {
    ((port & 0x0F) << 4) | (command as u8 & 0x0F)
}

/// Build a single-byte parameter frame (TX delay, persistence, slot time, ...).
pub fn parameter_frame(port: u8, command: KissCommand, value: u8) -> Vec<u8> {
    vec![FEND, command_byte(port, command), value, FEND]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_byte_packs_port_and_command() {
        assert_eq!(command_byte(0, KissCommand::DataFrame), 0x00);
        assert_eq!(command_byte(2, KissCommand::DataFrame), 0x20);
        assert_eq!(command_byte(1, KissCommand::TxDelay), 0x11);
    }

    #[test]
    fn parameter_frame_shape() {
        let f = parameter_frame(0, KissCommand::SlotTime, 10);
        assert_eq!(f, vec![FEND, 0x03, 10, FEND]);
    }

    #[test]
    fn command_from_byte() {
        assert_eq!(KissCommand::from_byte(0x00), Some(KissCommand::DataFrame));
        assert_eq!(KissCommand::from_byte(0xFF), Some(KissCommand::Return));
        assert_eq!(KissCommand::from_byte(0x42), None);
    }
}
