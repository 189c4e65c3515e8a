//! Personality state record and its atomically replaced JSON mirror.
//!
//! External bridges poll the state file, so every flush goes through a
//! temp file in the same directory followed by a rename.
//!
//! CHANGELOG:
//! - 10/16/2026 - Clamp updated_ts so flushes never go backwards
//! - 10/16/2026 - Initial implementation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Idle,
    Sleep,
    Demo,
}

/// Visual cue for the eyes display bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyesCue {
    #[default]
    Idle,
    Speak,
    Happy,
    Focus,
    Sleep,
}

/// Audio cue for the sound bridge. Absent means "stop".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCue {
    RevStartup,
    RevHappy,
    IdleLow,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Idle => "idle",
            Mode::Sleep => "sleep",
            Mode::Demo => "demo",
        }
    }
}

impl EyesCue {
    pub fn as_str(&self) -> &'static str {
        match self {
            EyesCue::Idle => "idle",
            EyesCue::Speak => "speak",
            EyesCue::Happy => "happy",
            EyesCue::Focus => "focus",
            EyesCue::Sleep => "sleep",
        }
    }
}

impl SoundCue {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoundCue::RevStartup => "rev_startup",
            SoundCue::RevHappy => "rev_happy",
            SoundCue::IdleLow => "idle_low",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for EyesCue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SoundCue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single shared state record, serialized verbatim to the state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub mode: Mode,
    pub last_cmd: Option<String>,
    pub last_status: String,
    pub eyes_state: EyesCue,
    pub sound_cue: Option<SoundCue>,
    pub base: Option<String>,
    pub updated_ts: Option<i64>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            mode: Mode::Idle,
            last_cmd: None,
            last_status: "Starting".to_string(),
            eyes_state: EyesCue::Idle,
            sound_cue: None,
            base: None,
            updated_ts: None,
        }
    }
}

/// Errors from writing the state file.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("cannot serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Owner of the in-memory state and its durable copy.
pub struct StateStore {
    state: State,
    path: PathBuf,
}

impl StateStore {
    /// Create a store with default state; nothing is written until `flush`.
    pub fn new(path: impl Into<PathBuf>, base: Option<String>) -> Self {
        Self {
            state: State {
                base,
                ..State::default()
            },
            path: path.into(),
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.state.mode = mode;
    }

    pub fn set_last_cmd(&mut self, raw: &str) {
        self.state.last_cmd = Some(raw.to_string());
    }

    pub fn set_last_status(&mut self, status: String) {
        self.state.last_status = status;
    }

    /// Apply a UI change and flush. `None` leaves that cue as it was.
    pub fn set_ui(&mut self, eyes: Option<EyesCue>, sound: Option<SoundCue>) {
        if let Some(eyes) = eyes {
            self.state.eyes_state = eyes;
        }
        if let Some(sound) = sound {
            self.state.sound_cue = Some(sound);
        }
        self.commit();
    }

    /// Flush, logging instead of failing. Memory stays authoritative.
    pub fn commit(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "state flush failed");
        }
    }

    /// Refresh `updated_ts` and atomically replace the state file.
    pub fn flush(&mut self) -> Result<(), PersistError> {
        let now = chrono::Utc::now().timestamp();
        let ts = match self.state.updated_ts {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        self.state.updated_ts = Some(ts);

        let body = serde_json::to_string_pretty(&self.state)?;
        write_atomic(&self.path, body.as_bytes()).map_err(|source| PersistError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Temp file beside `path`, so the rename never crosses filesystems.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = temp_path(path);
    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Read the state file back (used by status tooling and tests).
pub fn load_state(path: &Path) -> anyhow::Result<State> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_shape() {
        let value = serde_json::to_value(State::default()).unwrap();
        assert_eq!(value["mode"], "idle");
        assert_eq!(value["eyes_state"], "idle");
        assert_eq!(value["last_status"], "Starting");
        assert!(value["last_cmd"].is_null());
        assert!(value["sound_cue"].is_null());
        assert!(value["updated_ts"].is_null());
    }

    #[test]
    fn test_cue_wire_names() {
        assert_eq!(serde_json::to_value(SoundCue::RevStartup).unwrap(), "rev_startup");
        assert_eq!(serde_json::to_value(SoundCue::IdleLow).unwrap(), "idle_low");
        assert_eq!(serde_json::to_value(EyesCue::Focus).unwrap(), "focus");
        assert_eq!(SoundCue::RevHappy.to_string(), "rev_happy");
    }

    #[test]
    fn test_flush_writes_full_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut store = StateStore::new(&path, Some("/opt/kilo".to_string()));
        store.set_mode(Mode::Sleep);
        store.set_ui(Some(EyesCue::Sleep), Some(SoundCue::IdleLow));

        let on_disk = load_state(&path).unwrap();
        assert_eq!(&on_disk, store.state());
        assert_eq!(on_disk.mode, Mode::Sleep);
        assert_eq!(on_disk.base.as_deref(), Some("/opt/kilo"));
        assert!(on_disk.updated_ts.is_some());
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_set_ui_none_keeps_cues() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StateStore::new(dir.path().join("state.json"), None);
        store.set_ui(Some(EyesCue::Happy), Some(SoundCue::RevHappy));
        store.set_ui(Some(EyesCue::Focus), None);
        assert_eq!(store.state().eyes_state, EyesCue::Focus);
        assert_eq!(store.state().sound_cue, Some(SoundCue::RevHappy));
    }

    #[test]
    fn test_updated_ts_never_decreases() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StateStore::new(dir.path().join("state.json"), None);
        let future = chrono::Utc::now().timestamp() + 3600;
        store.state.updated_ts = Some(future);
        store.flush().unwrap();
        assert_eq!(store.state().updated_ts, Some(future));
    }

    #[test]
    fn test_flush_failure_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StateStore::new(dir.path().join("missing").join("state.json"), None);
        assert!(matches!(store.flush(), Err(PersistError::Write { .. })));

        // commit swallows the error and memory keeps the change
        store.set_mode(Mode::Demo);
        store.commit();
        assert_eq!(store.state().mode, Mode::Demo);
    }
}
