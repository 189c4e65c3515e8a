//! Wire protocol for the command socket.
//!
//! Requests are one line: a bare word (`wake`) or a small JSON object
//! (`{"cmd": "wake"}`). Replies are one JSON line, then the daemon closes.
//!
//! CHANGELOG:
//! - 10/16/2026 - Initial implementation

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A decoded request line.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Trimmed raw line as received
    pub raw: String,
    /// Normalized (lower-case) command name; empty if none was given
    pub name: String,
    /// Extra fields of a structured request
    pub extra: Map<String, Value>,
}

impl Request {
    /// Decode a raw payload: JSON object first, then the first token.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();

        if let Ok(mut fields) = serde_json::from_str::<Map<String, Value>>(raw) {
            let name = match fields.remove("cmd") {
                None => String::new(),
                Some(Value::String(s)) => s,
                // Any other value goes by its printed name: null is "none"
                Some(Value::Null) => "none".to_string(),
                Some(other) => other.to_string(),
            };
            return Self {
                raw: raw.to_string(),
                name: name.trim().to_lowercase(),
                extra: fields,
            };
        }

        Self {
            raw: raw.to_string(),
            name: raw
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_lowercase(),
            extra: Map::new(),
        }
    }
}

/// Reply sent back on the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn success(msg: impl Into<String>) -> Self {
        Self {
            ok: true,
            msg: Some(msg.into()),
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            msg: None,
            error: Some(error.into()),
        }
    }

    /// Serialize as a single newline-terminated line.
    pub fn to_line(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }

    pub fn from_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }
}
