//! Design tokens: named colours, spacing, radii and fonts.
//!
//! A plain owned value with its own load/save. Nothing in the core reads
//! it implicitly; callers pass it where they need it.

use crate::config::ConfigError;
use crate::node::SerializableColor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignTokens {
    pub name: String,
    /// Colour name to hex.
    pub colors: BTreeMap<String, String>,
    /// Spacing scale, smallest first.
    pub spacing: Vec<f64>,
    pub radii: BTreeMap<String, f64>,
    pub fonts: BTreeMap<String, String>,
}

impl Default for DesignTokens {
    fn default() -> Self {
        let colors = [
            ("background", "#ffffff"),
            ("surface", "#f4f4f5"),
            ("border", "#d4d4d8"),
            ("text", "#18181b"),
            ("muted", "#71717a"),
            ("primary", "#2563eb"),
            ("danger", "#dc2626"),
        ];
        Self {
            name: "Default".to_string(),
            colors: colors.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            spacing: vec![0.0, 4.0, 8.0, 12.0, 16.0, 24.0, 32.0, 48.0],
            radii: [("none", 0.0), ("sm", 4.0), ("md", 8.0), ("lg", 16.0)]
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            fonts: [("body", "Inter"), ("heading", "Inter"), ("mono", "JetBrains Mono")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl DesignTokens {
    /// Named colour, if defined and valid hex.
    pub fn color(&self, name: &str) -> Option<SerializableColor> {
        self.colors.get(name).and_then(|hex| SerializableColor::from_hex(hex))
    }

    pub fn set_color(&mut self, name: &str, color: SerializableColor) {
        self.colors.insert(name.to_string(), color.to_hex());
    }

    /// Spacing step `index`, clamped to the last step.
    pub fn space(&self, index: usize) -> f64 {
        self.spacing
            .get(index)
            .or(self.spacing.last())
            .copied()
            .unwrap_or(0.0)
    }

    pub fn radius(&self, name: &str) -> Option<f64> {
        self.radii.get(name).copied()
    }

    pub fn font(&self, role: &str) -> Option<&str> {
        self.fonts.get(role).map(String::as_str)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
