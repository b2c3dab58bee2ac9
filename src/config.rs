//! YAML configuration with environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ── Section structs ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    #[serde(default = "default_station_callsign")]
    pub callsign: String,
    #[serde(default = "default_station_description")]
    pub description: String,
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirewolfConfig {
    #[serde(default = "default_localhost")]
    pub host: String,
    #[serde(default = "default_direwolf_port")]
    pub port: u16,
    #[serde(default = "default_direwolf_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelnetConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_localhost")]
    pub host: String,
    #[serde(default = "default_telnet_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_radio_model")]
    pub model: String,
    #[serde(default = "default_radio_device")]
    pub device: String,
    #[serde(default = "default_radio_baud")]
    pub baud: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeConfig {
    #[serde(default = "default_claude_model")]
    pub model: String,
    #[serde(default = "default_claude_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_claude_temperature")]
    pub temperature: f64,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_search_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PotaConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_pota_max_spots")]
    pub max_spots: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DxClusterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_dx_max_spots")]
    pub max_spots: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandConditionsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_queries_per_hour")]
    pub queries_per_hour: i64,
    #[serde(default = "default_queries_per_day")]
    pub queries_per_day: i64,
    #[serde(default = "default_max_response_chars")]
    pub max_response_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle timeout in seconds; 0 means sessions drop at disconnect.
    #[serde(default)]
    pub timeout: u64,
    #[serde(default = "default_max_context_messages")]
    pub max_context_messages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTransferConfig {
    /// Per-file size cap in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_size: usize,
}

// ── Default helpers ─────────────────────────────────────────────────────

fn default_station_callsign() -> String { "N0CALL-10".into() }
fn default_station_description() -> String { "packetgate AI gateway".into() }
fn default_welcome_message() -> String { "Welcome to packetgate!".into() }
fn default_localhost() -> String { "localhost".into() }
fn default_direwolf_port() -> u16 { 8001 }
fn default_direwolf_timeout() -> u64 { 30 }
fn default_telnet_port() -> u16 { 8023 }
fn default_radio_model() -> String { "FTX-1".into() }
fn default_radio_device() -> String { "/dev/ttyUSB0".into() }
fn default_radio_baud() -> u32 { 4800 }
fn default_claude_model() -> String { "claude-3-5-sonnet-20241022".into() }
fn default_claude_max_tokens() -> u32 { 500 }
fn default_claude_temperature() -> f64 { 0.7 }
fn default_system_prompt() -> String {
    "You are an AI assistant accessible via amateur packet radio. \
     Keep responses concise and clear as they will be transmitted over radio."
        .into()
}
fn default_search_max_results() -> usize { 5 }
fn default_pota_max_spots() -> usize { 10 }
fn default_dx_max_spots() -> usize { 15 }
fn default_true() -> bool { true }
fn default_queries_per_hour() -> i64 { 10 }
fn default_queries_per_day() -> i64 { 50 }
fn default_max_response_chars() -> usize { 1024 }
fn default_log_dir() -> PathBuf { PathBuf::from("logs") }
fn default_log_format() -> String { "json".into() }
fn default_log_level() -> String { "INFO".into() }
fn default_database_path() -> String { "data/sessions.db".into() }
fn default_max_context_messages() -> usize { 20 }
fn default_max_file_size() -> usize { 100 * 1024 }

macro_rules! default_section {
    ($($ty:ty),* $(,)?) => {
        $(impl Default for $ty {
            fn default() -> Self {
                serde_yaml::from_str("{}").expect("section defaults")
            }
        })*
    };
}

default_section!(
    StationConfig,
    DirewolfConfig,
    TelnetConfig,
    RadioConfig,
    ClaudeConfig,
    SearchConfig,
    PotaConfig,
    DxClusterConfig,
    BandConditionsConfig,
    RateLimitConfig,
    LoggingConfig,
    DatabaseConfig,
    SessionConfig,
    FileTransferConfig,
);

// ── Top-level config ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default)]
    pub direwolf: DirewolfConfig,
    #[serde(default)]
    pub telnet: TelnetConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub claude: ClaudeConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub pota: PotaConfig,
    #[serde(default)]
    pub dx_cluster: DxClusterConfig,
    #[serde(default)]
    pub band_conditions: BandConditionsConfig,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
    #[serde(default)]
    pub file_transfer: FileTransferConfig,
}

impl Config {
    /// Load from a YAML file. A missing file is a hard error; the path comes
    /// from `--config`, `CONFIG_PATH`, or the default location.
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Configuration file not found: {} ({})", path.display(), e))?;
        serde_yaml::from_str(&raw).map_err(|e| format!("Invalid configuration: {}", e))
    }

    /// Resolve the config path: explicit flag, then `CONFIG_PATH`, then the
    /// conventional location.
    pub fn resolve_path(flag: Option<&str>) -> PathBuf {
        if let Some(path) = flag {
            return PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(path);
        }
        PathBuf::from("config/config.yaml")
    }

    // ── Environment-sourced secrets ─────────────────────────────────

    pub fn anthropic_api_key() -> Result<String, String> {
        std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            "ANTHROPIC_API_KEY not found in environment variables".to_string()
        })
    }

    pub fn qrz_api_key() -> String {
        std::env::var("QRZ_API_KEY").unwrap_or_default()
    }

    pub fn qrz_username() -> String {
        std::env::var("QRZ_USERNAME").unwrap_or_default()
    }

    pub fn qrz_password() -> String {
        std::env::var("QRZ_PASSWORD").unwrap_or_default()
    }

    /// `LOG_LEVEL` beats the config file.
    pub fn log_level(&self) -> String {
        std::env::var("LOG_LEVEL").unwrap_or_else(|_| self.logging.level.clone()).to_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.station.callsign, "N0CALL-10");
        assert_eq!(config.direwolf.port, 8001);
        assert_eq!(config.telnet.port, 8023);
        assert!(!config.telnet.enabled);
        assert_eq!(config.claude.max_tokens, 500);
        assert_eq!(config.rate_limits.queries_per_hour, 10);
        assert_eq!(config.rate_limits.queries_per_day, 50);
        assert_eq!(config.rate_limits.max_response_chars, 1024);
        assert!(config.rate_limits.enabled);
        assert_eq!(config.sessions.timeout, 0);
        assert_eq!(config.sessions.max_context_messages, 20);
        assert_eq!(config.file_transfer.max_size, 100 * 1024);
        assert!(config.band_conditions.enabled);
    }

    #[test]
    fn partial_yaml_overrides_fields() {
        let yaml = r#"
station:
  callsign: W2ASM-10
  description: Test station
telnet:
  enabled: true
  port: 9023
rate_limits:
  queries_per_hour: 2
sessions:
  timeout: 600
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.station.callsign, "W2ASM-10");
        assert!(config.telnet.enabled);
        assert_eq!(config.telnet.port, 9023);
        assert_eq!(config.rate_limits.queries_per_hour, 2);
        // Untouched siblings keep their defaults.
        assert_eq!(config.rate_limits.queries_per_day, 50);
        assert_eq!(config.sessions.timeout, 600);
        assert_eq!(config.station.welcome_message, "Welcome to packetgate!");
    }

    #[test]
    fn load_missing_file_is_an_error() {
        assert!(Config::load(Path::new("/nonexistent/config.yaml")).is_err());
    }

    #[test]
    fn resolve_path_prefers_flag() {
        let path = Config::resolve_path(Some("/tmp/x.yaml"));
        assert_eq!(path, PathBuf::from("/tmp/x.yaml"));
    }
}
