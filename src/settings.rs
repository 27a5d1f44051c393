//! Settings for the resolution engine itself.
//! Loaded from an optional `metalware.yaml` at the repository root.

use crate::constants::{DEFAULT_MAX_RENDER_DEPTH, SETTINGS_FILES};
use crate::error::{Error, Result};
use log::debug;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Nested render calls allowed before a reference is treated as a cycle
    pub max_render_depth: usize,
    /// Raise instead of warn when an answer is missing
    pub strict_answers: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self { max_render_depth: DEFAULT_MAX_RENDER_DEPTH, strict_answers: false }
    }
}

impl Settings {
    pub fn with_max_render_depth(mut self, depth: usize) -> Self {
        self.max_render_depth = depth;
        self
    }

    pub fn with_strict_answers(mut self, strict: bool) -> Self {
        self.strict_answers = strict;
        self
    }
}

/// Loads settings from the first settings file found in `root`.
///
/// # Returns
/// * `Result<Settings>` - Parsed settings, or the defaults when no file exists
///
/// # Errors
/// * `Error::YamlError` if the file is not valid YAML
/// * `Error::ConfigError` if the depth bound is zero
pub fn load_settings<P: AsRef<Path>>(root: P) -> Result<Settings> {
    for file in SETTINGS_FILES {
        let path = root.as_ref().join(file);
        if !path.exists() {
            continue;
        }
        debug!("Loading settings from {}", path.display());
        let content = std::fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(Settings::default());
        }
        let settings: Settings = serde_yaml::from_str(&content)
            .map_err(|e| Error::yaml(path.display().to_string(), e))?;
        if settings.max_render_depth == 0 {
            return Err(Error::ConfigError(format!(
                "max_render_depth in '{}' must be at least 1",
                path.display()
            )));
        }
        return Ok(settings);
    }
    Ok(Settings::default())
}
