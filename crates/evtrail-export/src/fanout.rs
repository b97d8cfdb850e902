//! Fan-out sink

use evtrail_core::{Level, LogPayload, Sink};
use std::fmt;
use std::sync::Arc;

/// Delivers every record to each inner sink, in registration order.
///
/// A level is supported only if every inner sink supports it.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl Sink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn with_shared(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Sink for FanoutSink {
    fn supports(&self, level: Level) -> bool {
        self.sinks.iter().all(|s| s.supports(level))
    }

    fn deliver(&self, level: Level, message: &str, payload: &LogPayload) {
        for sink in &self.sinks {
            sink.deliver(level, message, payload);
        }
    }
}

impl fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
