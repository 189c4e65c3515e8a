//! Personality service - the command table and its handlers.
//!
//! Owns the state store. Every dispatch records `last_cmd`/`last_status` and
//! flushes the state file before the reply is handed back to the server.
//!
//! CHANGELOG:
//! - 10/16/2026 - Handler faults become error replies instead of escaping
//! - 10/16/2026 - Initial implementation

use anyhow::Result;
use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DaemonConfig;
use crate::daemon::protocol::{Reply, Request};
use crate::daemon::state::{EyesCue, Mode, SoundCue, State, StateStore};
use crate::speech::{Kilosay, Speaker};

/// A command handler. Returns the reply message, or a fault.
pub type Handler = fn(&mut Personality, &Request) -> Result<String>;

/// Protocol-level dispatch errors.
#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0}")]
    Unknown(String),
}

/// Fixed mapping from command name to handler.
#[derive(Clone)]
pub struct CommandTable {
    handlers: BTreeMap<&'static str, Handler>,
}

impl CommandTable {
    /// The built-in personality commands.
    pub fn builtin() -> Self {
        let mut table = Self {
            handlers: BTreeMap::new(),
        };
        table.insert("status", status);
        table.insert("greeting", greeting);
        table.insert("joke", joke);
        table.insert("scan", scan);
        table.insert("sleep", sleep);
        table.insert("wake", wake);
        table.insert("demo", demo);
        table
    }

    pub fn insert(&mut self, name: &'static str, handler: Handler) {
        self.handlers.insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    fn resolve(&self, name: &str) -> Result<Handler, CommandError> {
        if name.is_empty() {
            return Err(CommandError::Empty);
        }
        self.get(name)
            .ok_or_else(|| CommandError::Unknown(name.to_string()))
    }
}

/// The robot's personality: state, command table, voice.
pub struct Personality {
    store: StateStore,
    speaker: Box<dyn Speaker>,
    table: CommandTable,
    demo_pause: Duration,
}

impl Personality {
    pub fn new(store: StateStore, speaker: Box<dyn Speaker>, demo_pause: Duration) -> Self {
        Self {
            store,
            speaker,
            table: CommandTable::builtin(),
            demo_pause,
        }
    }

    /// Personality speaking through the configured kilosay program.
    pub fn from_config(config: &DaemonConfig) -> Self {
        let store = StateStore::new(
            &config.state_path,
            Some(config.base_dir.to_string_lossy().into_owned()),
        );
        let speaker = Kilosay::new(&config.speech_program, config.autospeak);
        Self::new(store, Box::new(speaker), config.demo_step_pause)
    }

    /// Replace the command table (before serving).
    pub fn with_table(mut self, table: CommandTable) -> Self {
        self.table = table;
        self
    }

    pub fn state(&self) -> &State {
        self.store.state()
    }

    /// Publish the current state without changing it.
    pub fn publish(&mut self) {
        self.store.commit();
    }

    /// Liveness line plus a flush.
    pub fn heartbeat(&mut self) {
        let state = self.store.state();
        info!(
            mode = %state.mode,
            eyes = %state.eyes_state,
            sound = state.sound_cue.map(|s| s.as_str()).unwrap_or("none"),
            "heartbeat"
        );
        self.store.commit();
    }

    /// Run one raw command line through the table.
    pub fn dispatch(&mut self, raw: &str) -> Reply {
        let request = Request::parse(raw);
        self.store.set_last_cmd(&request.raw);
        let name = request.name.clone();

        let outcome = match self.table.resolve(&name) {
            Ok(handler) => handler(self, &request).map_err(|e| {
                warn!(cmd = %name, error = %e, "command failed");
                e.to_string()
            }),
            Err(e) => Err(e.to_string()),
        };

        let reply = match outcome {
            Ok(msg) => {
                self.store.set_last_status(format!("{} ok", name));
                Reply::success(msg)
            }
            Err(detail) => {
                let status = if name.is_empty() {
                    format!("error: {}", detail)
                } else {
                    format!("{} error: {}", name, detail)
                };
                self.store.set_last_status(status);
                Reply::error(detail)
            }
        };

        self.store.commit();
        reply
    }

    fn say(&self, line: &str) {
        self.speaker.say(line);
    }

    fn pause(&self) {
        if !self.demo_pause.is_zero() {
            thread::sleep(self.demo_pause);
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

const GREETING_LINE: &str = "Kilo Truck—fully loaded with charm and sarcasm.";
const JOKE_LINE: &str = "Why don’t Dodges tell jokes? They can’t handle the punchline.";
const SCAN_LINE: &str = "Scanning. Holler if you see a Vespa before I do.";
const SLEEP_LINE: &str = "Fine, but I’m dreaming of Vespas again.";
const WAKE_LINE: &str = "Up and running. Didn’t even cross my fingers this time.";

/// Report mode and bookkeeping. Silent, status is too chatty to speak.
fn status(p: &mut Personality, _req: &Request) -> Result<String> {
    let state = p.state();
    let msg = format!(
        "mode={}, last_cmd={}, status={}",
        state.mode,
        state.last_cmd.as_deref().unwrap_or("none"),
        state.last_status
    );
    info!("STATUS: {}", msg);
    p.store.set_ui(Some(EyesCue::Speak), None);
    Ok(msg)
}

fn greeting(p: &mut Personality, _req: &Request) -> Result<String> {
    info!("SAY: {}", GREETING_LINE);
    p.store.set_ui(Some(EyesCue::Happy), Some(SoundCue::RevHappy));
    p.say(GREETING_LINE);
    Ok(GREETING_LINE.to_string())
}

fn joke(p: &mut Personality, _req: &Request) -> Result<String> {
    info!("JOKE: {}", JOKE_LINE);
    p.store.set_ui(Some(EyesCue::Speak), None);
    p.say(JOKE_LINE);
    Ok(JOKE_LINE.to_string())
}

/// Background scanning stays quiet.
fn scan(p: &mut Personality, _req: &Request) -> Result<String> {
    info!("SCAN: {}", SCAN_LINE);
    p.store.set_ui(Some(EyesCue::Focus), None);
    Ok(SCAN_LINE.to_string())
}

fn sleep(p: &mut Personality, _req: &Request) -> Result<String> {
    p.store.set_mode(Mode::Sleep);
    info!("SLEEP: {}", SLEEP_LINE);
    p.store.set_ui(Some(EyesCue::Sleep), Some(SoundCue::IdleLow));
    p.say(SLEEP_LINE);
    Ok(SLEEP_LINE.to_string())
}

fn wake(p: &mut Personality, _req: &Request) -> Result<String> {
    p.store.set_mode(Mode::Idle);
    info!("WAKE: {}", WAKE_LINE);
    p.store.set_ui(Some(EyesCue::Happy), Some(SoundCue::RevStartup));
    p.say(WAKE_LINE);
    Ok(WAKE_LINE.to_string())
}

/// One step of the demo script.
struct DemoStep {
    name: &'static str,
    line: &'static str,
    eyes: EyesCue,
    sound: Option<SoundCue>,
    speaks: bool,
}

const DEMO_SCRIPT: [DemoStep; 5] = [
    DemoStep {
        name: "boot",
        line: "Kilo online. Batteries charged, patience limited.",
        eyes: EyesCue::Happy,
        sound: Some(SoundCue::RevStartup),
        speaks: true,
    },
    DemoStep {
        name: "scan",
        line: "Scanning my surroundings… no Dodges detected. Life’s good.",
        eyes: EyesCue::Focus,
        sound: None,
        speaks: false,
    },
    DemoStep {
        name: "quip",
        line: "All squared away. Don’t mess it up.",
        eyes: EyesCue::Speak,
        sound: None,
        speaks: true,
    },
    DemoStep {
        name: "dreams",
        line: "If you see a Vespa, wake me gently.",
        eyes: EyesCue::Sleep,
        sound: Some(SoundCue::IdleLow),
        speaks: false,
    },
    DemoStep {
        name: "wake",
        line: "Demo over. I’m still cooler than Barney.",
        eyes: EyesCue::Happy,
        sound: Some(SoundCue::RevStartup),
        speaks: true,
    },
];

/// Walk the demo script. The pause between steps keeps speech from overlapping.
fn demo(p: &mut Personality, _req: &Request) -> Result<String> {
    p.store.set_mode(Mode::Demo);
    for step in DEMO_SCRIPT.iter() {
        info!(step = step.name, "DEMO: {}", step.line);
        p.store.set_ui(Some(step.eyes), step.sound);
        if step.speaks {
            p.say(step.line);
        }
        p.pause();
    }
    p.store.set_mode(Mode::Idle);
    Ok("demo complete".to_string())
}
