//! Logger settings
//!
//! Plain values consumed at construction. They can be built in code,
//! parsed from TOML, and overridden from the environment.

use crate::error::EngineError;
use crate::level::Level;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::InvalidSettings(err.to_string())
    }
}

/// Resource limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Keys a context store may hold
    pub max_context_keys: usize,

    /// Deepest fork id allowed (separators in the dotted id)
    pub max_fork_depth: usize,

    /// Correlations that may be active at once per root logger
    pub max_active_correlations: usize,

    /// Context diagnostics a handle queues for its next record; further
    /// entries are only counted
    pub max_pending_diagnostics: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_context_keys: 100,
            max_fork_depth: 10,
            max_active_correlations: 1000,
            max_pending_diagnostics: 64,
        }
    }
}

/// Complete logger settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerSettings {
    pub limits: Limits,

    /// Strip escape sequences and flatten newlines in string fields
    pub sanitize_strings: bool,

    /// Records below this level are not delivered
    pub min_level: Level,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            sanitize_strings: true,
            min_level: Level::Trace,
        }
    }
}

impl LoggerSettings {
    /// Parse from a TOML document
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let settings: LoggerSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut settings: LoggerSettings = toml::from_str(&content)?;
        settings.apply_env_overrides();
        settings.validate()?;
        info!("Logger settings loaded from: {}", path.display());
        Ok(settings)
    }

    /// Apply `EVTRAIL_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("EVTRAIL_MAX_CONTEXT_KEYS") {
            override_with(&mut self.limits.max_context_keys, "EVTRAIL_MAX_CONTEXT_KEYS", &val);
        }
        if let Some(val) = lookup("EVTRAIL_MAX_FORK_DEPTH") {
            override_with(&mut self.limits.max_fork_depth, "EVTRAIL_MAX_FORK_DEPTH", &val);
        }
        if let Some(val) = lookup("EVTRAIL_MAX_ACTIVE_CORRELATIONS") {
            override_with(
                &mut self.limits.max_active_correlations,
                "EVTRAIL_MAX_ACTIVE_CORRELATIONS",
                &val,
            );
        }
        if let Some(val) = lookup("EVTRAIL_SANITIZE_STRINGS") {
            override_with(&mut self.sanitize_strings, "EVTRAIL_SANITIZE_STRINGS", &val);
        }
        if let Some(val) = lookup("EVTRAIL_MIN_LEVEL") {
            override_with(&mut self.min_level, "EVTRAIL_MIN_LEVEL", &val);
        }
    }

    /// Validate settings
    pub fn validate(&self) -> ConfigResult<()> {
        if self.limits.max_active_correlations == 0 {
            return Err(ConfigError::ValidationError(
                "max_active_correlations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn override_with<T: std::str::FromStr>(target: &mut T, name: &str, val: &str) {
    match val.trim().parse() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!("Ignoring unparsable {}: {}", name, val),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = LoggerSettings::default();
        assert_eq!(settings.limits.max_context_keys, 100);
        assert_eq!(settings.limits.max_fork_depth, 10);
        assert_eq!(settings.limits.max_active_correlations, 1000);
        assert_eq!(settings.limits.max_pending_diagnostics, 64);
        assert!(settings.sanitize_strings);
        assert_eq!(settings.min_level, Level::Trace);
    }

    #[test]
    fn test_parse_partial_toml() {
        let settings = LoggerSettings::from_toml_str(
            r#"
            min_level = "warn"

            [limits]
            max_fork_depth = 3
        "#,
        )
        .unwrap();
        assert_eq!(settings.min_level, Level::Warn);
        assert_eq!(settings.limits.max_fork_depth, 3);
        assert_eq!(settings.limits.max_context_keys, 100);
    }

    #[test]
    fn test_zero_correlations_rejected() {
        let result = LoggerSettings::from_toml_str(
            r#"
            [limits]
            max_active_correlations = 0
        "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("EVTRAIL_MAX_CONTEXT_KEYS", "7"),
            ("EVTRAIL_MIN_LEVEL", "error"),
            ("EVTRAIL_SANITIZE_STRINGS", "false"),
            ("EVTRAIL_MAX_FORK_DEPTH", "lots"),
        ]
        .into_iter()
        .collect();

        let mut settings = LoggerSettings::default();
        settings.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(settings.limits.max_context_keys, 7);
        assert_eq!(settings.min_level, Level::Error);
        assert!(!settings.sanitize_strings);
        // Unparsable value leaves the default in place
        assert_eq!(settings.limits.max_fork_depth, 10);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sanitize_strings = false").unwrap();
        let settings = LoggerSettings::from_file(file.path()).unwrap();
        assert!(!settings.sanitize_strings);
    }

    #[test]
    fn test_round_trip_toml() {
        let text = toml::to_string_pretty(&LoggerSettings::default()).unwrap();
        assert!(text.contains("[limits]"));
        assert_eq!(
            LoggerSettings::from_toml_str(&text).unwrap(),
            LoggerSettings::default()
        );
    }
}
