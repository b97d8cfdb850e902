//! Sink contract
//!
//! A sink receives each finished record synchronously, at the record's
//! severity. Delivery is fire-and-forget: the core neither retries nor
//! buffers, and a slow sink slows its caller.

use crate::level::Level;
use crate::payload::LogPayload;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Consumer of finished records
pub trait Sink: Send + Sync {
    /// Whether this sink can deliver `level`
    fn supports(&self, level: Level) -> bool {
        let _ = level;
        true
    }

    /// Deliver one record
    fn deliver(&self, level: Level, message: &str, payload: &LogPayload);
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn supports(&self, level: Level) -> bool {
        (**self).supports(level)
    }

    fn deliver(&self, level: Level, message: &str, payload: &LogPayload) {
        (**self).deliver(level, message, payload)
    }
}

/// Levels in `required` that `sink` cannot deliver
pub fn missing_levels(sink: &dyn Sink, required: impl IntoIterator<Item = Level>) -> Vec<Level> {
    required.into_iter().filter(|l| !sink.supports(*l)).collect()
}

/// Delivery function for one level
pub type LevelFn = Box<dyn Fn(&str, &LogPayload) + Send + Sync>;

/// A sink made of one function per level.
///
/// Levels without a function are unsupported; building a logger that may
/// deliver at such a level fails.
#[derive(Default)]
pub struct LevelSink {
    handlers: BTreeMap<Level, LevelFn>,
}

impl LevelSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the function for `level`
    pub fn on(mut self, level: Level, f: impl Fn(&str, &LogPayload) + Send + Sync + 'static) -> Self {
        self.handlers.insert(level, Box::new(f));
        self
    }

    /// Register the same function for every level
    pub fn all<F>(mut self, f: F) -> Self
    where
        F: Fn(Level, &str, &LogPayload) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        for level in Level::ALL {
            let f = Arc::clone(&f);
            self.handlers
                .insert(level, Box::new(move |msg, payload| f(level, msg, payload)));
        }
        self
    }
}

impl Sink for LevelSink {
    fn supports(&self, level: Level) -> bool {
        self.handlers.contains_key(&level)
    }

    fn deliver(&self, level: Level, message: &str, payload: &LogPayload) {
        if let Some(handler) = self.handlers.get(&level) {
            handler(message, payload);
        }
    }
}

impl fmt::Debug for LevelSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelSink")
            .field("levels", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// One record captured by [`MemorySink`]
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedRecord {
    pub level: Level,
    pub message: String,
    pub payload: LogPayload,
}

/// Sink that keeps every record in memory, in delivery order
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<CapturedRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CapturedRecord> {
        self.records.lock().clone()
    }

    /// Records whose event key equals `key`
    pub fn with_key(&self, key: &str) -> Vec<CapturedRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.payload.event_key == key)
            .cloned()
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|r| r.payload.event_key.clone())
            .collect()
    }

    pub fn last(&self) -> Option<CapturedRecord> {
        self.records.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Sink for MemorySink {
    fn deliver(&self, level: Level, message: &str, payload: &LogPayload) {
        self.records.lock().push(CapturedRecord {
            level,
            message: message.to_string(),
            payload: payload.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fork::ForkId;
    use crate::payload::PayloadBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_level_sink_reports_missing() {
        let sink = LevelSink::new()
            .on(Level::Info, |_, _| {})
            .on(Level::Error, |_, _| {});
        let missing = missing_levels(&sink, Level::at_or_above(Level::Info));
        assert_eq!(
            missing,
            vec![
                Level::Audit,
                Level::Warn,
                Level::Alert,
                Level::Critical,
                Level::Fatal
            ]
        );
    }

    #[test]
    fn test_level_sink_dispatch() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let sink = LevelSink::new().all(move |level, _, _| {
            if level == Level::Warn {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        let payload = PayloadBuilder::new("x", "c", ForkId::root()).build();
        sink.deliver(Level::Warn, "m", &payload);
        sink.deliver(Level::Info, "m", &payload);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(missing_levels(&sink, Level::ALL).is_empty());
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        for key in ["a", "b", "c"] {
            let payload = PayloadBuilder::new(key, "c", ForkId::root()).build();
            sink.deliver(Level::Info, key, &payload);
        }
        assert_eq!(sink.keys(), vec!["a", "b", "c"]);
        assert_eq!(sink.last().unwrap().message, "c");
    }
}
