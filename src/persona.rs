//! Persona content survey.
//!
//! The personality directory carries persona/people/quips files for the
//! chat side of Kilo. The daemon only checks they are usable and logs the
//! result; nothing here is fatal.
//!
//! CHANGELOG:
//! - 10/16/2026 - Initial implementation

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// How a content file is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Must parse as JSON
    Json,
    /// Must be readable UTF-8 text
    Text,
}

/// Files checked under the personality directory.
pub const PERSONA_FILES: [(&str, ContentKind); 4] = [
    ("persona.json", ContentKind::Json),
    ("people.json", ContentKind::Json),
    ("quips.yaml", ContentKind::Text),
    ("persona_full.yaml", ContentKind::Text),
];

/// Outcome of probing the personality directory.
#[derive(Debug, Default)]
pub struct ContentReport {
    pub usable: Vec<PathBuf>,
    pub unusable: Vec<PathBuf>,
}

impl ContentReport {
    pub fn all_usable(&self) -> bool {
        self.unusable.is_empty()
    }
}

/// Check one content file.
pub fn check_file(path: &Path, kind: ContentKind) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    if kind == ContentKind::Json {
        serde_json::from_str::<serde_json::Value>(&content)
            .with_context(|| format!("cannot parse {}", path.display()))?;
    }
    Ok(())
}

/// Check every persona file under `base`, logging each result.
pub fn survey(base: &Path) -> ContentReport {
    let mut report = ContentReport::default();
    for (name, kind) in PERSONA_FILES {
        let path = base.join(name);
        match check_file(&path, kind) {
            Ok(()) => {
                info!(path = %path.display(), "ok");
                report.usable.push(path);
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "persona content unavailable");
                report.unusable.push(path);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_survey_reports_each_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("persona.json"), r#"{"name": "Kilo"}"#).unwrap();
        fs::write(dir.path().join("people.json"), "not json").unwrap();
        fs::write(dir.path().join("quips.yaml"), "- Vespa spotted\n").unwrap();

        let report = survey(dir.path());
        assert_eq!(
            report.usable,
            vec![dir.path().join("persona.json"), dir.path().join("quips.yaml")]
        );
        assert_eq!(
            report.unusable,
            vec![dir.path().join("people.json"), dir.path().join("persona_full.yaml")]
        );
        assert!(!report.all_usable());
    }

    #[test]
    fn test_missing_directory_is_not_fatal() {
        let report = survey(Path::new("/definitely/not/here"));
        assert_eq!(report.unusable.len(), PERSONA_FILES.len());
    }

    #[test]
    fn test_text_files_need_not_be_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quips.yaml");
        fs::write(&path, "quips: [\"hi\"]\n").unwrap();
        assert!(check_file(&path, ContentKind::Text).is_ok());
        assert!(check_file(&path, ContentKind::Json).is_err());
    }
}
