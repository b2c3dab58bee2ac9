//! Amateur band plan helpers shared by the spotting tools.

/// HF/VHF/UHF band edges in kHz.
pub const BANDS: &[(&str, f64, f64)] = &[
    ("160m", 1_800.0, 2_000.0),
    ("80m", 3_500.0, 4_000.0),
    ("60m", 5_300.0, 5_405.0),
    ("40m", 7_000.0, 7_300.0),
    ("30m", 10_100.0, 10_150.0),
    ("20m", 14_000.0, 14_350.0),
    ("17m", 18_068.0, 18_168.0),
    ("15m", 21_000.0, 21_450.0),
    ("12m", 24_890.0, 24_990.0),
    ("10m", 28_000.0, 29_700.0),
    ("6m", 50_000.0, 54_000.0),
    ("2m", 144_000.0, 148_000.0),
    ("70cm", 420_000.0, 450_000.0),
];

/// Map a frequency in kHz to its band name.
pub fn freq_khz_to_band(freq_khz: f64) -> Option<&'static str> {
    BANDS
        .iter()
        .find(|(_, low, high)| freq_khz >= *low && freq_khz <= *high)
        .map(|(name, _, _)| *name)
}

/// Mode aliases: user-facing filter name to the spot-comment mode strings it
/// covers.
pub fn mode_aliases(filter: &str) -> &'static [&'static str] {
    match filter.to_lowercase().as_str() {
        "ssb" => &["SSB", "USB", "LSB", "PHONE"],
        "cw" => &["CW", "CWL", "CWU"],
        "digital" => &["FT8", "FT4", "RTTY", "PSK31", "PSK", "JT65", "MFSK", "OLIVIA", "THOR"],
        "ft8" => &["FT8"],
        "ft4" => &["FT4"],
        "rtty" => &["RTTY"],
        "psk" => &["PSK31", "PSK"],
        "phone" => &["SSB", "USB", "LSB", "PHONE", "AM", "FM"],
        _ => &[],
    }
}

/// Whether a spot's mode satisfies the user's filter.
pub fn mode_matches(spot_mode: &str, filter: &str) -> bool {
    let spot_mode = spot_mode.trim().to_uppercase();
    if spot_mode == filter.to_uppercase() {
        return true;
    }
    mode_aliases(filter).contains(&spot_mode.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_mapping() {
        assert_eq!(freq_khz_to_band(14_074.0), Some("20m"));
        assert_eq!(freq_khz_to_band(7_200.0), Some("40m"));
        assert_eq!(freq_khz_to_band(146_520.0), Some("2m"));
        assert_eq!(freq_khz_to_band(13_000.0), None);
    }

    #[test]
    fn band_edges_inclusive() {
        assert_eq!(freq_khz_to_band(14_000.0), Some("20m"));
        assert_eq!(freq_khz_to_band(14_350.0), Some("20m"));
    }

    #[test]
    fn alias_matching() {
        assert!(mode_matches("USB", "ssb"));
        assert!(mode_matches("FT8", "digital"));
        assert!(mode_matches("CW", "CW"));
        assert!(!mode_matches("CW", "ssb"));
        assert!(!mode_matches("FT8", "phone"));
    }
}
