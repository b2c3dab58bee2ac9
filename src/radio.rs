//! PTT control behind a narrow trait.
//!
//! The gateway itself never keys the transmitter (the TNC handles that), but
//! operators with CAT-controlled rigs can point the gateway at a rigctld
//! instance for explicit PTT override. Everything else uses the no-op
//! controller.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::RadioConfig;

/// Push-to-talk control.
#[async_trait]
pub trait PttController: Send + Sync {
    /// Key (true) or unkey (false) the transmitter. Returns success.
    async fn set_ptt(&self, on: bool) -> bool;
    fn is_enabled(&self) -> bool;
    fn description(&self) -> String;
}

/// Controller used when radio control is disabled.
pub struct NullPtt;

#[async_trait]
impl PttController for NullPtt {
    async fn set_ptt(&self, _on: bool) -> bool {
        true
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn description(&self) -> String {
        "radio control disabled".to_string()
    }
}

/// PTT over a rigctld network socket (`T 1` / `T 0`).
pub struct RigctldPtt {
    host: String,
    port: u16,
    model: String,
}

impl RigctldPtt {
    pub fn new(host: &str, port: u16, model: &str) -> Self {
        Self { host: host.to_string(), port, model: model.to_string() }
    }
}

#[async_trait]
impl PttController for RigctldPtt {
    async fn set_ptt(&self, on: bool) -> bool {
        let addr = format!("{}:{}", self.host, self.port);
        let command = if on { "T 1\n" } else { "T 0\n" };

        match TcpStream::connect(&addr).await {
            Ok(mut stream) => {
                if let Err(e) = stream.write_all(command.as_bytes()).await {
                    log::warn!("[radio] PTT write failed: {}", e);
                    return false;
                }
                let mut reply = [0u8; 64];
                match stream.read(&mut reply).await {
                    // rigctld answers "RPRT 0" on success.
                    Ok(n) => String::from_utf8_lossy(&reply[..n]).contains("RPRT 0"),
                    Err(e) => {
                        log::warn!("[radio] PTT read failed: {}", e);
                        false
                    }
                }
            }
            Err(e) => {
                log::warn!("[radio] cannot reach rigctld at {}: {}", addr, e);
                false
            }
        }
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn description(&self) -> String {
        format!("{} via rigctld {}:{}", self.model, self.host, self.port)
    }
}

/// Build the controller the config asks for.
pub fn from_config(config: &RadioConfig) -> Box<dyn PttController> {
    if !config.enabled {
        log::info!("[radio] control disabled, using null PTT");
        return Box::new(NullPtt);
    }

    // `device` of the form host:port selects rigctld; serial CAT control is
    // left to the TNC.
    if let Some((host, port)) = config.device.rsplit_once(':') {
        if let Ok(port) = port.parse::<u16>() {
            log::info!("[radio] PTT via rigctld at {}:{}", host, port);
            return Box::new(RigctldPtt::new(host, port, &config.model));
        }
    }

    log::warn!(
        "[radio] device '{}' is not a rigctld address; PTT control disabled",
        config.device
    );
    Box::new(NullPtt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_ptt_always_succeeds() {
        let ptt = NullPtt;
        assert!(ptt.set_ptt(true).await);
        assert!(ptt.set_ptt(false).await);
        assert!(!ptt.is_enabled());
    }

    #[test]
    fn factory_respects_disabled_flag() {
        let config = RadioConfig {
            enabled: false,
            model: "FTX-1".into(),
            device: "localhost:4532".into(),
            baud: 4800,
        };
        assert!(!from_config(&config).is_enabled());
    }

    #[test]
    fn factory_builds_rigctld_for_network_device() {
        let config = RadioConfig {
            enabled: true,
            model: "FTX-1".into(),
            device: "localhost:4532".into(),
            baud: 4800,
        };
        let ptt = from_config(&config);
        assert!(ptt.is_enabled());
        assert!(ptt.description().contains("rigctld"));
    }

    #[test]
    fn factory_falls_back_for_serial_device() {
        let config = RadioConfig {
            enabled: true,
            model: "FTX-1".into(),
            device: "/dev/ttyUSB0".into(),
            baud: 4800,
        };
        assert!(!from_config(&config).is_enabled());
    }

    #[tokio::test]
    async fn rigctld_unreachable_returns_false() {
        let ptt = RigctldPtt::new("127.0.0.1", 1, "FTX-1");
        assert!(!ptt.set_ptt(true).await);
    }
}
