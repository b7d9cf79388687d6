//! craftmon - Minecraft server lifecycle monitor.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use craftmon::config::ConfigLoader;
use craftmon::events::MonitorEvent;
use craftmon::monitor::Monitor;

#[derive(Parser)]
#[command(
    name = "craftmon",
    about = "Minecraft server lifecycle monitor over log tailing and RCON",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to the config file (default: .craftmon.toml, then user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the RCON host
    #[arg(long)]
    host: Option<String>,

    /// Override the RCON port
    #[arg(long)]
    port: Option<u16>,

    /// Override the server log file to tail
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let loader = match cli.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };

    let mut config = match loader.load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };

    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(log_file) = cli.log_file {
        config.log_file = log_file;
    }

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    }

    let mut monitor = match Monitor::new(&config) {
        Ok(monitor) => monitor,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create monitor");
            std::process::exit(1);
        }
    };

    // A rejected password is a configuration problem and worth dying over.
    // An unreachable server is normal (it may simply be down); the monitor
    // reconnects on demand once it comes up.
    match monitor.connect().await {
        Ok(()) => {}
        Err(e @ craftmon::rcon::RconError::Auth) => {
            tracing::error!(error = %e, "Initial RCON login failed");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::warn!(error = %e, "RCON not reachable yet, will retry on demand");
        }
    }

    tracing::info!(
        host = %config.host,
        port = config.port,
        log_file = %config.log_file.display(),
        "Starting craftmon"
    );

    // Stand-in notifier: relay monitor events to the log. An external chat
    // client would subscribe the same way.
    let mut events = monitor.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(MonitorEvent::Wakeup(info)) => {
                    tracing::info!(
                        software = %info.server_software,
                        mc = %info.mc_version,
                        "Server is up"
                    );
                }
                Ok(MonitorEvent::Closed) => {
                    tracing::info!("Server went down");
                }
                Ok(MonitorEvent::Rendered(Some(world))) => {
                    tracing::info!(%world, "Render job active");
                }
                Ok(MonitorEvent::Rendered(None)) => {
                    tracing::info!("No render job active");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Notifier lagged behind the event bus");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    if let Err(e) = monitor.run().await {
        tracing::error!(error = %e, "Monitor failed");
        std::process::exit(1);
    }
}
