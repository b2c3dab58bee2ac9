//! Logging setup: console plus a daily log file, text or JSON lines.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use env_logger::Target;
use log::LevelFilter;

use crate::config::Config;

/// Writer that duplicates every line to stderr and the log file.
pub struct TeeWriter {
    file: Option<File>,
}

impl TeeWriter {
    pub fn new(file: Option<File>) -> Self {
        Self { file }
    }
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _ = std::io::stderr().write_all(buf);
        if let Some(file) = self.file.as_mut() {
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let _ = std::io::stderr().flush();
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
        Ok(())
    }
}

fn level_filter(level: &str) -> LevelFilter {
    match level.to_uppercase().as_str() {
        "TRACE" => LevelFilter::Trace,
        "DEBUG" => LevelFilter::Debug,
        "WARN" | "WARNING" => LevelFilter::Warn,
        "ERROR" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// Render one record as a JSON line.
pub fn json_line(level: &str, target: &str, message: &str) -> String {
    serde_json::json!({
        "timestamp": Utc::now().to_rfc3339(),
        "level": level,
        "logger": target,
        "message": message,
    })
    .to_string()
}

/// Initialize global logging per the config. Called once from `main`.
pub fn init(config: &Config) {
    let log_dir = &config.logging.log_dir;
    let file = open_daily_log(log_dir);
    let json = config.logging.format.eq_ignore_ascii_case("json");
    let level = level_filter(&config.log_level());

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level)
        .target(Target::Pipe(Box::new(TeeWriter::new(file))));

    if json {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{}",
                json_line(record.level().as_str(), record.target(), &record.args().to_string())
            )
        });
    } else {
        builder.format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {} - {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S"),
                record.target(),
                record.level(),
                record.args()
            )
        });
    }

    // init() can only succeed once; repeated calls in tests are harmless.
    let _ = builder.try_init();
}

fn open_daily_log(log_dir: &Path) -> Option<File> {
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("Warning: cannot create log directory {}: {}", log_dir.display(), e);
        return None;
    }
    let name = format!("packetgate_{}.log", Utc::now().format("%Y%m%d"));
    match OpenOptions::new().create(true).append(true).open(log_dir.join(&name)) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Warning: cannot open log file {}: {}", name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parsing() {
        assert_eq!(level_filter("debug"), LevelFilter::Debug);
        assert_eq!(level_filter("WARNING"), LevelFilter::Warn);
        assert_eq!(level_filter("bogus"), LevelFilter::Info);
    }

    #[test]
    fn json_line_shape() {
        let line = json_line("INFO", "packetgate::gateway", "started");
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["level"], "INFO");
        assert_eq!(parsed["logger"], "packetgate::gateway");
        assert_eq!(parsed["message"], "started");
        assert!(parsed["timestamp"].as_str().is_some());
    }

    #[test]
    fn tee_writer_tolerates_no_file() {
        let mut tee = TeeWriter::new(None);
        assert_eq!(tee.write(b"x").unwrap(), 1);
        tee.flush().unwrap();
    }
}
