mod editor;
mod stream;

pub use editor::*;
pub use stream::*;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub editor: EditorConfig,
}

impl Config {
    /// Load from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!(path, error = %e, "no usable config file, using defaults");
                Self::default()
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let editor = &self.editor;

        if editor.base_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "editor.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        }

        if editor.credentials.is_none() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "editor.credentials".into(),
                message: "no credentials configured (set EDITOR_API_CREDENTIALS)".into(),
            });
        }

        if editor.futures_capacity == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "editor.futures_capacity".into(),
                message: "futures_capacity must be greater than 0".into(),
            });
        }

        if editor.stream.backoff_exponent < 1.0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "editor.stream.backoff_exponent".into(),
                message: "exponent below 1.0 makes back-off shrink between failures".into(),
            });
        }

        if editor.stream.max_failures == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "editor.stream.max_failures".into(),
                message: "max_failures must be greater than 0".into(),
            });
        }

        errors
    }
}
