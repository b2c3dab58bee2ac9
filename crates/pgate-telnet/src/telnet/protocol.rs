//! Telnet protocol bytes (RFC 854) and the NEW-ENVIRON option (RFC 1572).

/// Interpret As Command.
pub const IAC: u8 = 255;
/// DON'T.
pub const DONT: u8 = 254;
/// DO.
pub const DO: u8 = 253;
/// WON'T.
pub const WONT: u8 = 252;
/// WILL.
pub const WILL: u8 = 251;
/// Sub-negotiation begin.
pub const SB: u8 = 250;
/// Go ahead.
pub const GA: u8 = 249;
/// No operation.
pub const NOP: u8 = 241;
/// Sub-negotiation end.
pub const SE: u8 = 240;

/// NEW-ENVIRON option code (RFC 1572).
pub const NEW_ENVIRON: u8 = 39;

// ── NEW-ENVIRON sub-negotiation bytes ───────────────────────────────────

pub const ENV_IS: u8 = 0;
pub const ENV_SEND: u8 = 1;
pub const ENV_INFO: u8 = 2;

pub const ENV_VAR: u8 = 0;
pub const ENV_VALUE: u8 = 1;
pub const ENV_ESC: u8 = 2;
pub const ENV_USERVAR: u8 = 3;

/// `IAC DO NEW-ENVIRON`: ask the client to negotiate environment passing.
pub fn build_do_new_environ() -> Vec<u8> {
    vec![IAC, DO, NEW_ENVIRON]
}

/// `IAC SB NEW-ENVIRON SEND IAC SE`: request all variables.
pub fn build_env_send_request() -> Vec<u8> {
    vec![IAC, SB, NEW_ENVIRON, ENV_SEND, IAC, SE]
}

/// Parse a NEW-ENVIRON IS/INFO reply into (name, value) pairs.
///
/// Layout: `IS (VAR|USERVAR <name> [VALUE <value>])*`, with ESC escaping
/// special bytes inside names and values. Variables reported without a VALUE
/// are defined-but-empty and yield an empty string.
pub fn parse_new_environ(data: &[u8]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if data.is_empty() {
        return pairs;
    }

    // First byte is IS (client reply) or INFO (unsolicited update).
    let mut i = 1;

    while i < data.len() {
        if data[i] != ENV_VAR && data[i] != ENV_USERVAR {
            // Out of sync; skip to the next type marker.
            i += 1;
            continue;
        }
        i += 1;

        let mut name = Vec::new();
        while i < data.len() && !matches!(data[i], ENV_VAR | ENV_VALUE | ENV_USERVAR) {
            if data[i] == ENV_ESC && i + 1 < data.len() {
                i += 1;
            }
            name.push(data[i]);
            i += 1;
        }

        let mut value = Vec::new();
        if i < data.len() && data[i] == ENV_VALUE {
            i += 1;
            while i < data.len() && !matches!(data[i], ENV_VAR | ENV_USERVAR) {
                if data[i] == ENV_ESC && i + 1 < data.len() {
                    i += 1;
                }
                value.push(data[i]);
                i += 1;
            }
        }

        if !name.is_empty() {
            pairs.push((
                String::from_utf8_lossy(&name).to_string(),
                String::from_utf8_lossy(&value).to_string(),
            ));
        }
    }

    pairs
}

/// Pull the login identity (USER or LOGNAME) out of a NEW-ENVIRON reply.
pub fn extract_login_name(data: &[u8]) -> Option<String> {
    parse_new_environ(data)
        .into_iter()
        .find(|(name, value)| {
            !value.is_empty() && (name.eq_ignore_ascii_case("USER") || name.eq_ignore_ascii_case("LOGNAME"))
        })
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_user_variable() {
        // IS VAR "USER" VALUE "K0ASM"
        let data = [ENV_IS, ENV_VAR, b'U', b'S', b'E', b'R', ENV_VALUE, b'K', b'0', b'A', b'S', b'M'];
        let pairs = parse_new_environ(&data);
        assert_eq!(pairs, vec![("USER".to_string(), "K0ASM".to_string())]);
    }

    #[test]
    fn parse_multiple_variables() {
        let mut data = vec![ENV_IS];
        data.extend_from_slice(&[ENV_VAR, b'U', b'S', b'E', b'R', ENV_VALUE, b'a']);
        data.extend_from_slice(&[ENV_USERVAR, b'T', b'Z', ENV_VALUE, b'U', b'T', b'C']);
        let pairs = parse_new_environ(&data);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1], ("TZ".to_string(), "UTC".to_string()));
    }

    #[test]
    fn parse_variable_without_value() {
        let data = [ENV_IS, ENV_VAR, b'X'];
        let pairs = parse_new_environ(&data);
        assert_eq!(pairs, vec![("X".to_string(), String::new())]);
    }

    #[test]
    fn parse_escaped_bytes() {
        // Name "A\x01B" with the VALUE byte escaped.
        let data = [ENV_IS, ENV_VAR, b'A', ENV_ESC, ENV_VALUE, b'B', ENV_VALUE, b'v'];
        let pairs = parse_new_environ(&data);
        assert_eq!(pairs[0].0.as_bytes(), &[b'A', ENV_VALUE, b'B']);
        assert_eq!(pairs[0].1, "v");
    }

    #[test]
    fn parse_empty_input() {
        assert!(parse_new_environ(&[]).is_empty());
        assert!(parse_new_environ(&[ENV_IS]).is_empty());
    }

    #[test]
    fn extract_user_login() {
        let data = [ENV_IS, ENV_VAR, b'U', b'S', b'E', b'R', ENV_VALUE, b'k', b'0', b'a', b's', b'm'];
        assert_eq!(extract_login_name(&data), Some("k0asm".to_string()));
    }

    #[test]
    fn extract_logname_login() {
        let mut data = vec![ENV_IS];
        data.extend_from_slice(&[ENV_VAR, b'L', b'O', b'G', b'N', b'A', b'M', b'E']);
        data.push(ENV_VALUE);
        data.extend_from_slice(b"W1AW");
        assert_eq!(extract_login_name(&data), Some("W1AW".to_string()));
    }

    #[test]
    fn extract_ignores_other_variables() {
        let data = [ENV_IS, ENV_VAR, b'T', b'Z', ENV_VALUE, b'U', b'T', b'C'];
        assert_eq!(extract_login_name(&data), None);
    }

    #[test]
    fn solicitation_bytes() {
        assert_eq!(build_do_new_environ(), vec![0xFF, 0xFD, 0x27]);
        assert_eq!(build_env_send_request(), vec![0xFF, 0xFA, 0x27, 0x01, 0xFF, 0xF0]);
    }
}
