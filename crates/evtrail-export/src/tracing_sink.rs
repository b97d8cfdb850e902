//! Sink that forwards records to `tracing`
//!
//! Lets a host route evtrail records through whatever subscriber it already
//! runs. Levels without a `tracing` counterpart are mapped to the nearest
//! one: `audit` to INFO, `alert`/`critical`/`fatal` to ERROR.

use evtrail_core::{Level, LogPayload, Sink};
use tracing::{debug, error, info, trace, warn};

/// Forwards every record to the `tracing` macros
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink {
    /// Attach the full JSON payload as a field
    pub include_payload: bool,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(mut self) -> Self {
        self.include_payload = true;
        self
    }
}

/// `tracing` level a record level is forwarded at
pub fn tracing_level(level: Level) -> tracing::Level {
    match level {
        Level::Trace => tracing::Level::TRACE,
        Level::Debug => tracing::Level::DEBUG,
        Level::Info | Level::Audit => tracing::Level::INFO,
        Level::Warn => tracing::Level::WARN,
        Level::Error | Level::Alert | Level::Critical | Level::Fatal => tracing::Level::ERROR,
    }
}

macro_rules! forward {
    ($mac:ident, $severity:ident, $key:ident, $corr:ident, $fork:ident, $body:ident, $message:ident) => {
        $mac!(
            target: "evtrail",
            severity = $severity,
            event_key = $key,
            correlation_id = $corr,
            fork_id = %$fork,
            payload = $body,
            "{}",
            $message
        )
    };
}

impl Sink for TracingSink {
    fn deliver(&self, level: Level, message: &str, payload: &LogPayload) {
        let body = if self.include_payload {
            payload.to_json().to_string()
        } else {
            String::new()
        };
        let body = body.as_str();
        let severity = level.as_str();
        let key = payload.event_key.as_str();
        let corr = payload.correlation_id.as_str();
        let fork = &payload.fork_id;

        match tracing_level(level) {
            tracing::Level::TRACE => forward!(trace, severity, key, corr, fork, body, message),
            tracing::Level::DEBUG => forward!(debug, severity, key, corr, fork, body, message),
            tracing::Level::INFO => forward!(info, severity, key, corr, fork, body, message),
            tracing::Level::WARN => forward!(warn, severity, key, corr, fork, body, message),
            _ => forward!(error, severity, key, corr, fork, body, message),
        }
    }
}
