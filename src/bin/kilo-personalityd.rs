//! kilo-personalityd - personality daemon for the Kilo robot.
//!
//! CHANGELOG:
//! - 10/16/2026 - Initial implementation

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use kilo_personality::client::DaemonClient;
use kilo_personality::config::{self, DaemonConfig};
use kilo_personality::daemon::server::DaemonServer;
use kilo_personality::daemon::service::Personality;
use kilo_personality::persona;

#[derive(Parser)]
#[command(name = "kilo-personalityd")]
#[command(about = "Kilo personality daemon (socket + state file + autospeech)")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon
    Start {
        /// Personality directory (default: $KILO_PERSONALITY_DIR or /opt/kilo/personality)
        #[arg(long)]
        base: Option<String>,

        /// Socket path (default: <base>/kilo.sock)
        #[arg(long)]
        socket: Option<String>,

        /// State file path (default: <base>/state.json)
        #[arg(long)]
        state: Option<String>,

        /// Run in foreground (don't daemonize)
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the daemon
    Stop {
        /// Socket path
        #[arg(long)]
        socket: Option<String>,
    },

    /// Ask the daemon for its status
    Status {
        /// Socket path
        #[arg(long)]
        socket: Option<String>,

        /// Request timeout (seconds)
        #[arg(long, default_value = "2.0")]
        timeout: f64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            base,
            socket,
            state,
            foreground,
        } => cmd_start(resolve_config(base, socket, state), foreground),
        Commands::Stop { socket } => cmd_stop(resolve_config(None, socket, None)),
        Commands::Status { socket, timeout } => {
            cmd_status(resolve_config(None, socket, None), timeout)
        }
    }
}

/// Environment defaults, then CLI overrides. `--base` re-roots socket and state.
fn resolve_config(
    base: Option<String>,
    socket: Option<String>,
    state: Option<String>,
) -> DaemonConfig {
    let mut config = DaemonConfig::from_env();
    if let Some(base) = base {
        let rooted = DaemonConfig::with_base(config::expand_path(&base));
        config.base_dir = rooted.base_dir;
        config.socket_path = rooted.socket_path;
        config.state_path = rooted.state_path;
    }
    if let Some(socket) = socket {
        config.socket_path = config::expand_path(&socket);
    }
    if let Some(state) = state {
        config.state_path = config::expand_path(&state);
    }
    config
}

fn cmd_start(config: DaemonConfig, foreground: bool) -> Result<()> {
    for path in [&config.socket_path, &config.state_path] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    if foreground {
        return run(config);
    }

    // Background mode (fork into daemon process)
    use daemonize::Daemonize;

    let log_path = format!("{}.log", config.socket_path.display());
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path))?;

    let working_dir = if config.base_dir.is_dir() {
        config.base_dir.clone()
    } else {
        Path::new("/tmp").to_path_buf()
    };

    let daemonize = Daemonize::new()
        .pid_file(config.pid_file())
        .working_directory(working_dir)
        .stderr(log);

    match daemonize.start() {
        Ok(_) => run(config),
        Err(e) => {
            eprintln!("Failed to daemonize: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(config: DaemonConfig) -> Result<()> {
    info!(
        base = %config.base_dir.display(),
        autospeak = config.autospeak,
        "starting"
    );

    let report = persona::survey(&config.base_dir);
    if !report.all_usable() {
        info!(
            usable = report.usable.len(),
            missing = report.unusable.len(),
            "persona content incomplete; commands are unaffected"
        );
    }

    let personality = Personality::from_config(&config);
    let server = DaemonServer::bind(&config, personality)?;
    server.serve(shutdown_signal())
}

/// Resolves on SIGTERM or SIGINT.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = term.recv() => info!("caught SIGTERM; shutting down"),
                _ = tokio::signal::ctrl_c() => info!("caught SIGINT; shutting down"),
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot watch SIGTERM; only SIGINT stops the daemon");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

fn cmd_stop(config: DaemonConfig) -> Result<()> {
    let pid_file = config.pid_file();

    let pid_str = std::fs::read_to_string(&pid_file)
        .with_context(|| format!("Failed to read {}", pid_file.display()))?;
    let pid: i32 = pid_str.trim().parse()?;

    // SAFETY: kill(2) with a plain pid and signal has no memory effects.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        return Err(anyhow!(
            "Failed to signal pid {}: {}",
            pid,
            std::io::Error::last_os_error()
        ));
    }

    let _ = std::fs::remove_file(&pid_file);
    println!("Daemon stopped (pid {})", pid);

    Ok(())
}

fn cmd_status(config: DaemonConfig, timeout: f64) -> Result<()> {
    let client = DaemonClient::new(&config.socket_path, Duration::from_secs_f64(timeout));

    match client.send("status") {
        Ok(reply) if reply.ok => {
            println!("{}", reply.msg.unwrap_or_default());
            Ok(())
        }
        Ok(reply) => {
            println!("Daemon error: {}", reply.error.unwrap_or_default());
            std::process::exit(1);
        }
        Err(e) => {
            println!("Daemon not running ({})", e);
            std::process::exit(1);
        }
    }
}
