//! YAPP protocol constants and the 128-byte file header.

/// Enquiry - request to send.
pub const ENQ: u8 = 0x05;
/// Acknowledge.
pub const ACK: u8 = 0x06;
/// Negative acknowledge.
pub const NAK: u8 = 0x15;
/// Start of header.
pub const SOH: u8 = 0x01;
/// Start of data block.
pub const STX: u8 = 0x02;
/// End of data.
pub const ETX: u8 = 0x03;
/// End of transmission.
pub const EOT: u8 = 0x04;
/// Cancel.
pub const CAN: u8 = 0x18;

/// YAPP block size.
pub const BLOCK_SIZE: usize = 128;
/// Header packet body size.
pub const HEADER_SIZE: usize = 128;

/// Whether a payload looks like a YAPP packet (first byte is a control char).
pub fn is_yapp_packet(data: &[u8]) -> bool {
    matches!(data.first(), Some(&ENQ | &ACK | &NAK | &SOH | &STX | &ETX | &EOT | &CAN))
}

/// YAPP file header: `"<filename> <size> <mtime>\r"` NUL-padded to 128 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YappHeader {
    pub filename: String,
    pub file_size: usize,
    pub mtime: i64,
}

impl YappHeader {
    pub fn new(filename: impl Into<String>, file_size: usize, mtime: i64) -> Self {
        Self { filename: filename.into(), file_size, mtime }
    }

    /// Encode to the fixed 128-byte wire form, truncating the filename if the
    /// header would not fit.
    pub fn encode(&self) -> Vec<u8> {
        let mut header = format!("{} {} {}\r", self.filename, self.file_size, self.mtime);
        if header.len() > HEADER_SIZE {
            let fixed = self.file_size.to_string().len() + self.mtime.to_string().len() + 4;
            let max_name = HEADER_SIZE.saturating_sub(fixed);
            let name: String = self.filename.chars().take(max_name).collect();
            header = format!("{} {} {}\r", name, self.file_size, self.mtime);
        }

        let mut bytes = header.into_bytes();
        bytes.resize(HEADER_SIZE, 0);
        bytes.truncate(HEADER_SIZE);
        bytes
    }

    /// Decode from a 128-byte header body. Returns `None` on malformed input.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        let text = String::from_utf8_lossy(&data[..end]);
        let text = text.trim();

        let mut parts = text.split_whitespace();
        let filename = parts.next()?.to_string();
        let file_size = parts.next()?.parse::<usize>().ok()?;
        let mtime = parts.next().and_then(|p| p.parse::<i64>().ok()).unwrap_or(0);

        Some(Self { filename, file_size, mtime })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_yapp_packets() {
        assert!(is_yapp_packet(&[ENQ]));
        assert!(is_yapp_packet(&[STX, 1, 2]));
        assert!(!is_yapp_packet(b"hello"));
        assert!(!is_yapp_packet(&[]));
    }

    #[test]
    fn header_encode_is_128_bytes() {
        let h = YappHeader::new("test.txt", 5, 0);
        let enc = h.encode();
        assert_eq!(enc.len(), HEADER_SIZE);
        assert!(enc.starts_with(b"test.txt 5 0\r"));
        assert_eq!(enc[13], 0);
    }

    #[test]
    fn header_roundtrip() {
        let h = YappHeader::new("readme.md", 4096, 1700000000);
        let dec = YappHeader::decode(&h.encode()).unwrap();
        assert_eq!(dec, h);
    }

    #[test]
    fn header_decode_without_mtime() {
        let mut raw = b"a.bin 300\r".to_vec();
        raw.resize(HEADER_SIZE, 0);
        let dec = YappHeader::decode(&raw).unwrap();
        assert_eq!(dec.filename, "a.bin");
        assert_eq!(dec.file_size, 300);
        assert_eq!(dec.mtime, 0);
    }

    #[test]
    fn header_decode_rejects_garbage() {
        assert!(YappHeader::decode(&[0u8; HEADER_SIZE]).is_none());
        let mut raw = b"nameonly\r".to_vec();
        raw.resize(HEADER_SIZE, 0);
        assert!(YappHeader::decode(&raw).is_none());
    }

    #[test]
    fn header_encode_truncates_long_filename() {
        let name = "x".repeat(200);
        let h = YappHeader::new(name, 12345, 1700000000);
        let enc = h.encode();
        assert_eq!(enc.len(), HEADER_SIZE);
        let dec = YappHeader::decode(&enc).unwrap();
        assert_eq!(dec.file_size, 12345);
    }
}
