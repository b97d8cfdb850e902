//! Sink adapters for evtrail
//!
//! The core only defines the [`Sink`](evtrail_core::Sink) contract. This
//! crate provides sinks that hand records to the outside world, and a helper
//! for installing a `tracing` subscriber in a host binary.

pub mod broadcast;
pub mod fanout;
pub mod jsonl;
pub mod subscriber;
pub mod tracing_sink;

use thiserror::Error;

pub use broadcast::{BroadcastSink, Delivered};
pub use fanout::FanoutSink;
pub use jsonl::{JsonlSink, JsonlSinkConfig};
pub use subscriber::{init_subscriber, LogFormat, SubscriberSettings};
pub use tracing_sink::TracingSink;

/// Export errors
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid filter directive: {0}")]
    Filter(String),

    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;
