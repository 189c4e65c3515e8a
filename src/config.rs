//! Daemon configuration: paths, speech toggle, loop timings.
//!
//! Defaults come from the environment; the daemon CLI overrides paths.
//!
//! CHANGELOG:
//! - 10/16/2026 - Added connection cap and idle timeout
//! - 10/16/2026 - Initial implementation

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default personality directory on the robot.
pub const DEFAULT_BASE_DIR: &str = "/opt/kilo/personality";

/// Default speech backend.
pub const DEFAULT_SPEECH_PROGRAM: &str = "/usr/local/bin/kilosay";

/// Runtime settings for the personality daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Personality content directory (reported as `base` in the state file)
    pub base_dir: PathBuf,
    /// UNIX socket the daemon listens on
    pub socket_path: PathBuf,
    /// Canonical state file path
    pub state_path: PathBuf,
    /// Whether the speech dispatcher is enabled
    pub autospeak: bool,
    /// External speech executable
    pub speech_program: PathBuf,
    /// Liveness log + flush interval
    pub heartbeat_interval: Duration,
    /// Max simultaneously open client connections
    pub max_clients: usize,
    /// Close clients that send nothing within this window
    pub client_idle_timeout: Duration,
    /// Pause between demo steps
    pub demo_step_pause: Duration,
    /// Bytes read per client payload
    pub read_buffer: usize,
}

impl DaemonConfig {
    /// Build a config rooted at `base_dir` with default timings.
    pub fn with_base(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            socket_path: base_dir.join("kilo.sock"),
            state_path: base_dir.join("state.json"),
            base_dir,
            autospeak: true,
            speech_program: PathBuf::from(DEFAULT_SPEECH_PROGRAM),
            heartbeat_interval: Duration::from_secs(10),
            max_clients: 32,
            client_idle_timeout: Duration::from_secs(5),
            demo_step_pause: Duration::from_millis(200),
            read_buffer: 4096,
        }
    }

    /// Build a config from the environment.
    ///
    /// Reads `KILO_PERSONALITY_DIR`, `KILO_SOCKET`, `KILO_STATE_PATH`,
    /// `KILO_AUTOSPEAK` and `KILO_SAY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base = lookup("KILO_PERSONALITY_DIR")
            .map(|p| expand_path(&p))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BASE_DIR));
        let mut config = Self::with_base(base);

        if let Some(path) = lookup("KILO_SOCKET") {
            config.socket_path = expand_path(&path);
        }
        if let Some(path) = lookup("KILO_STATE_PATH") {
            config.state_path = expand_path(&path);
        }
        if let Some(flag) = lookup("KILO_AUTOSPEAK") {
            config.autospeak = parse_flag(&flag);
        }
        if let Some(program) = lookup("KILO_SAY") {
            config.speech_program = expand_path(&program);
        }

        config
    }

    /// PID file written next to the socket when daemonized.
    pub fn pid_file(&self) -> PathBuf {
        pid_file_for(&self.socket_path)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::with_base(DEFAULT_BASE_DIR)
    }
}

/// `<socket>.pid`
pub fn pid_file_for(socket_path: &Path) -> PathBuf {
    let mut name = socket_path.as_os_str().to_os_string();
    name.push(".pid");
    PathBuf::from(name)
}

/// Expand a leading `~` in a user-supplied path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

/// Truthy values: `1`, `true`, `yes`, `on` (case-insensitive).
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
