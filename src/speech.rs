//! Fire-and-forget speech through an external executable (kilosay).
//!
//! The control loop never waits on speech: each line runs on a detached
//! thread and failures only reach the log.
//!
//! CHANGELOG:
//! - 10/16/2026 - Initial implementation

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, warn};

/// Something that can speak a line without blocking the caller.
pub trait Speaker: Send {
    fn say(&self, line: &str);
}

/// Speech backed by an external program invoked as `<program> <line>`.
pub struct Kilosay {
    program: PathBuf,
    enabled: bool,
}

impl Kilosay {
    pub fn new(program: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            program: program.into(),
            enabled,
        }
    }
}

impl Speaker for Kilosay {
    fn say(&self, line: &str) {
        if !self.enabled || line.is_empty() {
            return;
        }
        if !is_executable(&self.program) {
            warn!(program = %self.program.display(), "speech program not found or not executable; skipping speech");
            return;
        }

        let program = self.program.clone();
        let line = line.to_string();
        let spawned = thread::Builder::new()
            .name("kilosay".to_string())
            .spawn(move || run_speech(&program, &line));
        if let Err(e) = spawned {
            warn!(error = %e, "cannot start speech thread");
        }
    }
}

fn run_speech(program: &Path, line: &str) {
    let status = Command::new(program)
        .arg(line)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => debug!(line, "speech finished"),
        Ok(status) => warn!(%status, "speech program failed"),
        Err(e) => warn!(error = %e, "speech program could not run"),
    }
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Speaker that remembers every line instead of speaking it.
#[derive(Clone, Default)]
pub struct RecordingSpeaker {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines spoken so far, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl Speaker for RecordingSpeaker {
    fn say(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}
