//! evtrail core - Schema-typed event logging with forks and correlations
//!
//! This crate provides the orchestration core of the logger:
//!
//! - **Handles**: root and forked logging handles with hierarchical fork ids
//! - **Context**: write-once metadata accumulation with a key cap
//! - **Correlations**: tracked units of work with an idle timeout
//! - **Validation**: advisory field checks against event schemas
//! - **Sinks**: the contract for consuming finished records

pub mod config;
pub mod context;
pub mod correlation;
pub mod error;
pub mod fork;
pub mod handle;
pub mod ids;
pub mod level;
pub mod metrics;
pub mod payload;
pub mod reserved;
pub mod schema;
pub mod sink;
pub mod timer;
pub mod validate;
pub mod value;

mod scope;

// Used by the `context!` macro
#[doc(hidden)]
pub use serde_json;

// Re-export commonly used types
pub use config::{ConfigError, Limits, LoggerSettings};
pub use context::{Collision, ContextRecord, ContextStore, ContextValidation};
pub use correlation::{Correlation, CorrelationStatus};
pub use error::{EngineError, EngineResult, ErrorCode};
pub use fork::ForkId;
pub use handle::{LogHandle, LoggerBuilder};
pub use ids::IdGenerator;
pub use level::Level;
pub use metrics::{EngineStats, StatsSnapshot};
pub use payload::{Diagnostics, LogPayload, PayloadBuilder};
pub use schema::{
    CorrelationEvents, CorrelationGroup, EventGroup, EventSchema, FieldSchema, FieldType,
};
pub use scope::ADHOC_EVENT_KEY;
pub use sink::{LevelSink, MemorySink, Sink};
pub use timer::IdleTimer;
pub use value::{ErrorValue, FieldMap, FieldValue, Fields};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
