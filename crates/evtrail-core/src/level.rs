//! Severity levels understood by sinks

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a delivered record.
///
/// Ordered from least to most severe, so `Level::Warn > Level::Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Audit,
    Warn,
    Error,
    Alert,
    Critical,
    Fatal,
}

impl Level {
    /// All levels, least severe first
    pub const ALL: [Level; 9] = [
        Level::Trace,
        Level::Debug,
        Level::Info,
        Level::Audit,
        Level::Warn,
        Level::Error,
        Level::Alert,
        Level::Critical,
        Level::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Audit => "audit",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Alert => "alert",
            Level::Critical => "critical",
            Level::Fatal => "fatal",
        }
    }

    /// Levels at or above `min`, i.e. every level a logger filtered at `min`
    /// can deliver.
    pub fn at_or_above(min: Level) -> impl Iterator<Item = Level> {
        Level::ALL.into_iter().filter(move |l| *l >= min)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown level: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_matches_severity() {
        assert!(Level::Fatal > Level::Critical);
        assert!(Level::Critical > Level::Alert);
        assert!(Level::Alert > Level::Error);
        assert!(Level::Error > Level::Warn);
        assert!(Level::Warn > Level::Audit);
        assert!(Level::Audit > Level::Info);
        assert!(Level::Info > Level::Debug);
        assert!(Level::Debug > Level::Trace);
    }

    #[test]
    fn test_parse() {
        assert_eq!("WARN".parse::<Level>().unwrap(), Level::Warn);
        assert_eq!(" audit ".parse::<Level>().unwrap(), Level::Audit);
        assert!("verbose".parse::<Level>().is_err());
    }

    #[test]
    fn test_at_or_above() {
        let levels: Vec<Level> = Level::at_or_above(Level::Alert).collect();
        assert_eq!(levels, vec![Level::Alert, Level::Critical, Level::Fatal]);
    }
}
