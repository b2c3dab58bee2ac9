//! Login banner.

/// ASCII banner with optional station callsign and grid square.
pub fn get_banner(callsign: &str, grid: &str) -> String {
    let mut banner = String::from(
        r"
 ____   _    ____ _  _______ _____ ____    _  _____ _____
|  _ \ / \  / ___| |/ / ____|_   _/ ___|  / \|_   _| ____|
| |_) / _ \| |   | ' /|  _|   | || |  _  / _ \ | | |  _|
|  __/ ___ \ |___| . \| |___  | || |_| |/ ___ \| | | |___
|_| /_/   \_\____|_|\_\_____| |_| \____/_/   \_\_| |_____|
",
    );

    let mut station_info = Vec::new();
    if !callsign.is_empty() {
        station_info.push(callsign.to_string());
    }
    if !grid.is_empty() {
        station_info.push(grid.to_string());
    }

    if station_info.is_empty() {
        banner.push_str("\n  packetgate\n");
    } else {
        banner.push_str(&format!("\n  packetgate | {}\n", station_info.join(" | ")));
    }
    banner.push_str("  AI-Powered Amateur Radio BBS\n");
    banner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_includes_station_info() {
        let banner = get_banner("W2ASM-10", "FN30aq");
        assert!(banner.contains("W2ASM-10"));
        assert!(banner.contains("FN30aq"));
        assert!(banner.contains("AI-Powered Amateur Radio BBS"));
    }

    #[test]
    fn banner_without_station_info() {
        let banner = get_banner("", "");
        assert!(banner.contains("packetgate"));
        assert!(!banner.contains(" | "));
    }
}
