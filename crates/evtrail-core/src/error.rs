//! Hard failures raised to the caller
//!
//! Data-quality problems never show up here; they are reported as
//! diagnostics on the emitted record instead.

use crate::level::Level;
use thiserror::Error;

/// Engine error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Sink does not support required levels: {}", join_levels(.missing))]
    UnsupportedSinkLevels { missing: Vec<Level> },

    #[error("Reserved keys in base metadata: {}", .keys.join(", "))]
    ReservedBaseMetadata { keys: Vec<String> },

    #[error("Fork depth {attempted} exceeds configured maximum {max}")]
    ForkDepthExceeded { attempted: usize, max: usize },

    #[error("Active correlation limit reached ({active}/{limit})")]
    CorrelationLimitExceeded { active: usize, limit: usize },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Discriminated code carried by every [`EngineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UnsupportedSinkLevel,
    ReservedMetadataKey,
    ForkDepthExceeded,
    CorrelationLimitExceeded,
    InvalidSettings,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnsupportedSinkLevel => "unsupported_sink_level",
            ErrorCode::ReservedMetadataKey => "reserved_metadata_key",
            ErrorCode::ForkDepthExceeded => "fork_depth_exceeded",
            ErrorCode::CorrelationLimitExceeded => "correlation_limit_exceeded",
            ErrorCode::InvalidSettings => "invalid_settings",
        }
    }
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::UnsupportedSinkLevels { .. } => ErrorCode::UnsupportedSinkLevel,
            EngineError::ReservedBaseMetadata { .. } => ErrorCode::ReservedMetadataKey,
            EngineError::ForkDepthExceeded { .. } => ErrorCode::ForkDepthExceeded,
            EngineError::CorrelationLimitExceeded { .. } => ErrorCode::CorrelationLimitExceeded,
            EngineError::InvalidSettings(_) => ErrorCode::InvalidSettings,
        }
    }
}

fn join_levels(levels: &[Level]) -> String {
    levels
        .iter()
        .map(Level::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
