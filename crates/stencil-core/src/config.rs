//! Editor tuning knobs.

use crate::history::DEFAULT_HISTORY_LIMIT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors loading or saving configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Undo states kept; the oldest goes first.
    pub history_limit: usize,
    /// Scene-space shift applied to duplicates.
    pub duplicate_offset: (f64, f64),
    /// Resize handle hotspot, in screen pixels.
    pub handle_size: f64,
    /// Whether locked nodes can be hit.
    pub hit_locked: bool,
    /// Skip undo points identical to the previous one.
    pub dedupe_history: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            duplicate_offset: (20.0, 20.0),
            handle_size: 8.0,
            hit_locked: false,
            dedupe_history: true,
        }
    }
}

impl EditorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = EditorConfig::from_json(r#"{"history_limit": 5}"#).unwrap();
        assert_eq!(config.history_limit, 5);
        assert_eq!(config.duplicate_offset, (20.0, 20.0));
        assert!(config.dedupe_history);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(EditorConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("editor.json");
        assert!(matches!(EditorConfig::load(&path), Err(ConfigError::Io(_))));

        let config = EditorConfig {
            hit_locked: true,
            ..EditorConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(EditorConfig::load(&path).unwrap(), config);
    }
}
