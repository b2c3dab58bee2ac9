//! Operator identity as resolved from the callsign directory.

use serde::{Deserialize, Serialize};

/// Directory attributes for one operator. Only `call` and `fullname` are
/// guaranteed; a failed lookup synthesizes both from the callsign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OperatorInfo {
    pub call: String,
    pub fullname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_expires: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aliases: Option<String>,
}

impl OperatorInfo {
    /// The fallback identity when the directory has no record: the callsign
    /// stands in for the name.
    pub fn unlisted(callsign: &str) -> Self {
        let callsign = callsign.to_uppercase();
        Self { call: callsign.clone(), fullname: callsign, ..Default::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlisted_uses_callsign_for_name() {
        let info = OperatorInfo::unlisted("k0asm");
        assert_eq!(info.call, "K0ASM");
        assert_eq!(info.fullname, "K0ASM");
        assert!(info.grid.is_none());
    }

    #[test]
    fn serialization_skips_empty_fields() {
        let info = OperatorInfo::unlisted("K0ASM");
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("grid"));
        assert!(json.contains("\"call\":\"K0ASM\""));
    }
}
