//! kilo-client - send one command to the personality daemon.
//!
//! CHANGELOG:
//! - 10/16/2026 - Initial implementation

use anyhow::{bail, Result};
use clap::Parser;
use std::time::Duration;

use kilo_personality::client::DaemonClient;
use kilo_personality::config::{self, DaemonConfig};

#[derive(Parser)]
#[command(name = "kilo-client")]
#[command(about = "Thin client for the Kilo personality daemon")]
struct Cli {
    /// Command to send (status, greeting, joke, scan, sleep, wake, demo)
    words: Vec<String>,

    /// Send a structured request verbatim, e.g. '{"cmd":"scan"}'
    #[arg(long, conflicts_with = "words")]
    json: Option<String>,

    /// Socket path (default: $KILO_SOCKET or <base>/kilo.sock)
    #[arg(long)]
    socket: Option<String>,

    /// Request timeout (seconds); demo takes about a second
    #[arg(long, default_value = "5.0")]
    timeout: f64,

    /// Print the raw reply JSON
    #[arg(long)]
    raw: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let command = match cli.json {
        Some(json) => json,
        None => cli.words.join(" "),
    };
    if command.trim().is_empty() {
        bail!("no command given");
    }

    let socket_path = match cli.socket {
        Some(socket) => config::expand_path(&socket),
        None => DaemonConfig::from_env().socket_path,
    };

    let client = DaemonClient::new(socket_path, Duration::from_secs_f64(cli.timeout));
    let reply = client.send(&command)?;

    if cli.raw {
        println!("{}", serde_json::to_string(&reply)?);
    } else if reply.ok {
        println!("{}", reply.msg.as_deref().unwrap_or_default());
    }

    if !reply.ok {
        if !cli.raw {
            eprintln!("Error: {}", reply.error.as_deref().unwrap_or("unknown"));
        }
        std::process::exit(1);
    }
    Ok(())
}
