//! Duet Signal Server
//!
//! WebSocket relay that pairs two peers per room and forwards their
//! session negotiation messages.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (port 8080, config from the user config dir if present)
//! duet-signal
//!
//! # Explicit config file and port override
//! duet-signal --config /etc/duet/config.toml --port 9000
//!
//! # Print the effective configuration and exit
//! duet-signal --print-config
//! ```

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use duet_core::{Config, LogConfig};
use duet_signal::SignalServer;

#[derive(Parser, Debug)]
#[command(name = "duet-signal")]
#[command(about = "Duet signaling relay for two-party session negotiation")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, env = "DUET_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "DUET_PORT")]
    port: Option<u16>,

    /// Bind address
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(port) = args.port {
        config.signal.port = port;
    }
    if let Some(bind) = args.bind {
        config.signal.bind = bind;
    }
    if args.json_logs {
        config.log.json = true;
    }

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_logging(&config.log);

    let addr = config.signal.addr();
    info!("Starting Duet Signal Server");

    let listener = TcpListener::bind(addr).await?;
    let server = SignalServer::new(config.signal);
    server
        .serve_listener(listener, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Stopped");
    Ok(())
}

fn init_logging(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(log.json.then(|| fmt::layer().json()))
        .with((!log.json).then(|| fmt::layer()))
        .init();
}
