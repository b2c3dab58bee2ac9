//! Daemon entry point.

use clap::Parser;
use log::{error, info};

use packetgate::config::Config;
use packetgate::gateway::Gateway;

/// Multi-transport amateur-radio BBS gateway with an AI assistant.
#[derive(Debug, Parser)]
#[command(name = "packetgate", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Run in telnet-only mode (no KISS/TNC connection)
    #[arg(long, conflicts_with = "kiss_only")]
    telnet_only: bool,

    /// Run in KISS-only mode (no telnet server)
    #[arg(long, conflicts_with = "telnet_only")]
    kiss_only: bool,

    /// Override the telnet port from the config
    #[arg(long)]
    telnet_port: Option<u16>,

    /// Override the telnet host from the config
    #[arg(long)]
    telnet_host: Option<String>,

    /// Override the TNC host from the config
    #[arg(long)]
    direwolf_host: Option<String>,

    /// Override the TNC port from the config
    #[arg(long)]
    direwolf_port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config_path = Config::resolve_path(cli.config.as_deref());
    let mut config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Copy config/config.yaml.example to config/config.yaml and configure it");
            std::process::exit(1);
        }
    };

    // CLI overrides beat the file.
    if let Some(port) = cli.telnet_port {
        config.telnet.port = port;
    }
    if let Some(host) = cli.telnet_host {
        config.telnet.host = host;
    }
    if let Some(host) = cli.direwolf_host {
        config.direwolf.host = host;
    }
    if let Some(port) = cli.direwolf_port {
        config.direwolf.port = port;
    }

    packetgate::logging::init(&config);
    info!("============================================================");
    info!("packetgate - amateur radio BBS gateway");
    info!("============================================================");

    let enable_kiss = !cli.telnet_only;
    let enable_telnet = !cli.kiss_only && (config.telnet.enabled || cli.telnet_only);

    let (gateway, tasks) = match Gateway::build(config, enable_kiss, enable_telnet).await {
        Ok(built) => built,
        Err(e) => {
            error!("Fatal: {}", e);
            eprintln!("Fatal error: {}", e);
            std::process::exit(1);
        }
    };

    gateway.start(tasks);
    info!("Press Ctrl+C to stop");

    // Run until a signal or an internal shutdown request.
    let running_gateway = gateway.clone();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
        }
        _ = async {
            while running_gateway.is_running() {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        } => {}
    }

    gateway.stop().await;
}
