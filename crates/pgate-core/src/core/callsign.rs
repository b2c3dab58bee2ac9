//! Amateur-radio callsign validation and normalization.
//!
//! Callsigns are stored upper-case. Session identity uses the *base* form
//! (no SSID, no portable prefix/suffix); the decorated form only survives
//! inside AX.25 addresses.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// 1-2 prefix characters, a digit, 1-4 suffix characters, optional -SSID.
    static ref CALLSIGN_RE: Regex =
        Regex::new(r"^[A-Z0-9]{1,2}[0-9][A-Z0-9]{1,4}(-[0-9]{1,2})?$").unwrap();
}

/// Validate a callsign (with or without SSID) against the standard pattern.
pub fn is_valid_callsign(callsign: &str) -> bool {
    CALLSIGN_RE.is_match(callsign.trim().to_uppercase().as_str())
}

/// Normalize a callsign to its base form.
///
/// - upper-cases and trims
/// - strips the SSID (`W2ASM-2` → `W2ASM`)
/// - strips portable prefix/suffix decorations (`VE2/W2ASM/3` → `W2ASM`)
pub fn normalize_callsign(callsign: &str) -> String {
    if callsign.is_empty() {
        return String::new();
    }

    let mut cs = callsign.trim().to_uppercase();

    // Strip SSID: everything after the last hyphen.
    if let Some(idx) = cs.rfind('-') {
        cs.truncate(idx);
    }

    // Strip prefix/suffix: among slash-separated parts, pick the one that
    // starts with a letter and contains a digit (the base callsign shape).
    if cs.contains('/') {
        let parts: Vec<&str> = cs.split('/').collect();
        for part in &parts {
            let starts_alpha = part.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false);
            if starts_alpha && part.chars().any(|c| c.is_ascii_digit()) {
                cs = (*part).to_string();
                break;
            }
        }
    }

    cs
}

/// Split a callsign string into (base, ssid). A missing or unparsable SSID
/// yields 0.
pub fn parse_callsign(callsign: &str) -> (String, u8) {
    let normalized = callsign.trim().to_uppercase();

    match normalized.split_once('-') {
        Some((base, ssid)) => {
            let ssid = ssid.parse::<u8>().unwrap_or(0);
            (base.to_string(), ssid)
        }
        None => (normalized, 0),
    }
}

/// Format a base callsign with its SSID. SSID 0 is conventionally omitted.
pub fn format_callsign(base: &str, ssid: u8) -> String {
    let base = base.trim().to_uppercase();
    if ssid > 0 {
        format!("{}-{}", base, ssid)
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Validation ──────────────────────────────────────────────────

    #[test]
    fn valid_plain_callsigns() {
        assert!(is_valid_callsign("W1AW"));
        assert!(is_valid_callsign("K0ASM"));
        assert!(is_valid_callsign("VE3XYZ"));
        assert!(is_valid_callsign("2E0ABC"));
    }

    #[test]
    fn valid_with_ssid() {
        assert!(is_valid_callsign("W2ASM-10"));
        assert!(is_valid_callsign("k0asm-1"));
    }

    #[test]
    fn invalid_callsigns() {
        assert!(!is_valid_callsign(""));
        assert!(!is_valid_callsign("HELLO"));
        assert!(!is_valid_callsign("W1AW-100"));
        assert!(!is_valid_callsign("127.0.0.1:5000"));
        assert!(!is_valid_callsign("W1 AW"));
    }

    // ── Normalization ───────────────────────────────────────────────

    #[test]
    fn normalize_strips_ssid() {
        assert_eq!(normalize_callsign("W2ASM-2"), "W2ASM");
        assert_eq!(normalize_callsign("w2asm-15"), "W2ASM");
    }

    #[test]
    fn normalize_strips_prefix_and_suffix() {
        assert_eq!(normalize_callsign("VE2/W2ASM"), "W2ASM");
        assert_eq!(normalize_callsign("W2ASM/P"), "W2ASM");
        assert_eq!(normalize_callsign("VE2/W2ASM/3"), "W2ASM");
    }

    #[test]
    fn normalize_uppercases() {
        assert_eq!(normalize_callsign("  k0asm "), "K0ASM");
    }

    #[test]
    fn normalize_empty() {
        assert_eq!(normalize_callsign(""), "");
    }

    // ── Parse / format ──────────────────────────────────────────────

    #[test]
    fn parse_with_and_without_ssid() {
        assert_eq!(parse_callsign("N0CALL-10"), ("N0CALL".to_string(), 10));
        assert_eq!(parse_callsign("N0CALL"), ("N0CALL".to_string(), 0));
        assert_eq!(parse_callsign("n0call-x"), ("N0CALL".to_string(), 0));
    }

    #[test]
    fn format_roundtrip() {
        assert_eq!(format_callsign("w2asm", 10), "W2ASM-10");
        assert_eq!(format_callsign("W2ASM", 0), "W2ASM");
        let (base, ssid) = parse_callsign("W2ASM-10");
        assert_eq!(format_callsign(&base, ssid), "W2ASM-10");
    }
}
