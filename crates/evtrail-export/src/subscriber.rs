//! Subscriber installation for host binaries
//!
//! The engine reports its own anomalies (collisions, dropped keys, leaked
//! correlations) through `tracing`. A host that has no subscriber of its own
//! can install one here.

use crate::{ExportError, ExportResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Subscriber settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberSettings {
    /// Filter directive, e.g. `"info"` or `"evtrail_core=debug,warn"`
    pub filter: String,

    /// Prefer `RUST_LOG` over `filter` when it is set
    pub respect_env: bool,

    pub format: LogFormat,

    /// Show event targets
    pub with_target: bool,
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
            respect_env: true,
            format: LogFormat::Text,
            with_target: false,
        }
    }
}

impl SubscriberSettings {
    /// Map a `-v` count to a filter directive
    pub fn from_verbosity(verbose: u8) -> Self {
        let filter = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        Self {
            filter: filter.to_string(),
            ..Self::default()
        }
    }
}

/// Build the filter `settings` describe
pub fn env_filter(settings: &SubscriberSettings) -> ExportResult<EnvFilter> {
    if settings.respect_env {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
    }
    EnvFilter::try_new(&settings.filter).map_err(|e| ExportError::Filter(e.to_string()))
}

/// Install a global fmt subscriber.
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_subscriber(settings: &SubscriberSettings) -> ExportResult<()> {
    let filter = env_filter(settings)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(settings.with_target)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = match settings.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| ExportError::Init(e.to_string()))
}
