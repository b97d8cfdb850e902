//! Root and fork handles
//!
//! A [`LogHandle`] is what application code logs through. The root handle
//! comes from [`LoggerBuilder`]; every other handle is a fork, with an
//! isolated copy of its parent's context and a hierarchical fork id.

use crate::config::{Limits, LoggerSettings};
use crate::context::{ContextRecord, ContextStore, ContextValidation};
use crate::correlation::{Correlation, CorrelationLink};
use crate::error::{EngineError, EngineResult};
use crate::fork::ForkId;
use crate::ids::IdGenerator;
use crate::level::Level;
use crate::metrics::{EngineStats, StatsSnapshot};
use crate::reserved::is_reserved;
use crate::schema::{CorrelationGroup, EventSchema};
use crate::scope::{Scope, Shared};
use crate::sink::{missing_levels, Sink};
use crate::value::Fields;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds the root [`LogHandle`]
pub struct LoggerBuilder {
    sink: Arc<dyn Sink>,
    settings: LoggerSettings,
    base_metadata: Vec<(String, Value)>,
    ids: IdGenerator,
}

impl LoggerBuilder {
    pub fn new(sink: impl Sink + 'static) -> Self {
        Self::with_shared_sink(Arc::new(sink))
    }

    pub fn with_shared_sink(sink: Arc<dyn Sink>) -> Self {
        Self {
            sink,
            settings: LoggerSettings::default(),
            base_metadata: Vec::new(),
            ids: IdGenerator::default(),
        }
    }

    pub fn settings(mut self, settings: LoggerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.settings.limits = limits;
        self
    }

    pub fn min_level(mut self, level: Level) -> Self {
        self.settings.min_level = level;
        self
    }

    pub fn sanitize_strings(mut self, enabled: bool) -> Self {
        self.settings.sanitize_strings = enabled;
        self
    }

    /// Metadata attached to every record of the root and its descendants
    pub fn base_metadata<I, K, V>(mut self, record: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.base_metadata
            .extend(record.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Validate the configuration and create the root handle.
    ///
    /// Fails when the sink cannot deliver a level at or above the minimum
    /// level, or when the base metadata uses a reserved key.
    pub fn build(self) -> EngineResult<LogHandle> {
        self.settings.validate()?;

        let missing = missing_levels(
            self.sink.as_ref(),
            Level::at_or_above(self.settings.min_level),
        );
        if !missing.is_empty() {
            return Err(EngineError::UnsupportedSinkLevels { missing });
        }

        let reserved: Vec<String> = self
            .base_metadata
            .iter()
            .filter(|(k, _)| is_reserved(k))
            .map(|(k, _)| k.clone())
            .collect();
        if !reserved.is_empty() {
            return Err(EngineError::ReservedBaseMetadata { keys: reserved });
        }

        let (context, outcome) =
            ContextStore::new(self.base_metadata, self.settings.limits.max_context_keys);

        let shared = Arc::new(Shared {
            sink: self.sink,
            settings: self.settings,
            ids: self.ids,
            active_correlations: AtomicUsize::new(0),
            stats: EngineStats::new(),
        });

        let scope = Scope::root(shared, context, outcome);
        debug!("Root logger created with correlation id {}", scope.correlation_id);
        Ok(LogHandle {
            scope,
            correlation: None,
        })
    }
}

/// A root or fork logging handle
pub struct LogHandle {
    scope: Scope,
    /// Correlation this handle was forked under, if any
    correlation: Option<Arc<CorrelationLink>>,
}

impl LogHandle {
    pub fn builder(sink: impl Sink + 'static) -> LoggerBuilder {
        LoggerBuilder::new(sink)
    }

    pub(crate) fn from_scope(scope: Scope, correlation: Option<Arc<CorrelationLink>>) -> Self {
        Self { scope, correlation }
    }

    fn touch(&self) {
        if let Some(link) = &self.correlation {
            link.touch();
        }
    }

    /// Emit a typed event at the schema's level.
    ///
    /// Missing, mistyped and undeclared fields are reported in the record's
    /// diagnostics block; this never fails.
    pub fn event(&mut self, schema: &EventSchema, fields: Fields) {
        self.touch();
        self.scope.emit_event(schema, fields);
    }

    /// Emit an untyped record
    pub fn log(&mut self, level: Level, message: &str, fields: Fields) {
        self.touch();
        self.scope.emit_log(level, message, fields);
    }

    /// Add metadata to this handle's context
    pub fn add_context<I, K, V>(&mut self, record: I) -> ContextValidation
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.touch();
        self.scope.add_context(record)
    }

    /// Create the next child handle.
    ///
    /// The child starts from a copy of this handle's context plus `extra`;
    /// later changes on either side are not shared.
    pub fn fork<I, K, V>(&mut self, extra: I) -> EngineResult<LogHandle>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.touch();
        let scope = self.scope.fork(extra)?;
        Ok(LogHandle {
            scope,
            correlation: self.correlation.clone(),
        })
    }

    /// Start a correlation for `group`.
    ///
    /// Fails before any state changes, including the enclosing correlation's
    /// idle timer, when the active-correlation limit is reached.
    pub fn start_correlation<I, K, V>(
        &self,
        group: &CorrelationGroup,
        metadata: I,
    ) -> EngineResult<Correlation>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        if let Err(err) = self.scope.shared.acquire_correlation() {
            warn!("Cannot start correlation {}: {}", group.key(), err);
            return Err(err);
        }
        self.touch();
        let scope = self.scope.correlation(metadata);
        Ok(Correlation::start(scope, group))
    }

    pub fn correlation_id(&self) -> &str {
        &self.scope.correlation_id
    }

    pub fn fork_id(&self) -> &ForkId {
        &self.scope.fork_id
    }

    /// Snapshot of this handle's context
    pub fn context(&self) -> ContextRecord {
        self.scope.context.snapshot()
    }

    /// Correlations currently active under this handle's root
    pub fn active_correlations(&self) -> usize {
        self.scope.shared.active_correlations()
    }

    pub fn settings(&self) -> &LoggerSettings {
        &self.scope.shared.settings
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.scope.shared.stats.snapshot()
    }
}

impl fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHandle")
            .field("correlation_id", &self.scope.correlation_id)
            .field("fork_id", &self.scope.fork_id.to_string())
            .field("context_keys", &self.scope.context.len())
            .field("in_correlation", &self.correlation.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;
    use crate::error::ErrorCode;
    use crate::fields;
    use crate::schema::FieldSchema;
    use crate::sink::{LevelSink, MemorySink};
    use serde_json::json;

    fn root(sink: &MemorySink) -> LogHandle {
        LogHandle::builder(sink.clone()).build().unwrap()
    }

    fn port_schema() -> EventSchema {
        EventSchema::new("server.listening", Level::Info, "listening on {port}")
            .field("port", FieldSchema::number().required())
    }

    #[test]
    fn test_event_with_missing_field_still_emits() {
        let sink = MemorySink::new();
        let mut log = root(&sink);
        log.event(&port_schema(), fields! {});

        let record = sink.last().unwrap();
        assert_eq!(record.level, Level::Info);
        assert!(record.payload.fields.is_empty());
        let diagnostics = record.payload.diagnostics.unwrap();
        assert_eq!(diagnostics.missing_fields, vec!["port"]);
        assert_eq!(record.message, "listening on {port}");
    }

    #[test]
    fn test_event_renders_message() {
        let sink = MemorySink::new();
        let mut log = root(&sink);
        log.event(&port_schema(), fields! { "port" => 8080 });

        let record = sink.last().unwrap();
        assert_eq!(record.message, "listening on 8080");
        assert!(record.payload.diagnostics.is_none());
        assert_eq!(record.payload.fork_id, ForkId::root());
        assert_eq!(record.payload.correlation_id, log.correlation_id());
    }

    #[test]
    fn test_fork_ids_per_parent() {
        let sink = MemorySink::new();
        let mut log = root(&sink);

        let mut a = log.fork(context! {}).unwrap();
        let mut b = log.fork(context! {}).unwrap();
        let a1 = a.fork(context! {}).unwrap();
        let b1 = b.fork(context! {}).unwrap();
        let a2 = a.fork(context! {}).unwrap();
        let c = log.fork(context! {}).unwrap();

        assert_eq!(a.fork_id().to_string(), "1");
        assert_eq!(b.fork_id().to_string(), "2");
        assert_eq!(a1.fork_id().to_string(), "1.1");
        assert_eq!(b1.fork_id().to_string(), "2.1");
        assert_eq!(a2.fork_id().to_string(), "1.2");
        assert_eq!(c.fork_id().to_string(), "3");
        assert_eq!(c.correlation_id(), log.correlation_id());
    }

    #[test]
    fn test_fork_context_is_isolated() {
        let sink = MemorySink::new();
        let mut log = root(&sink);
        log.add_context(context! { "service" => "api" });

        let mut child = log.fork(context! { "request" => "r1" }).unwrap();
        child.add_context(context! { "user" => "u1" });
        log.add_context(context! { "region" => "eu" });

        assert_eq!(
            child.context(),
            context! { "service" => "api", "request" => "r1", "user" => "u1" }
        );
        assert_eq!(log.context(), context! { "service" => "api", "region" => "eu" });
    }

    #[test]
    fn test_fork_extra_collision_keeps_parent_value() {
        let sink = MemorySink::new();
        let mut log = root(&sink);
        log.add_context(context! { "tenant" => "a" });
        let mut child = log.fork(context! { "tenant" => "b" }).unwrap();
        assert_eq!(child.context()["tenant"], json!("a"));

        child.log(Level::Info, "hello", fields! {});
        let diagnostics = sink.last().unwrap().payload.diagnostics.unwrap();
        assert_eq!(diagnostics.collisions[0].key, "tenant");
    }

    #[test]
    fn test_fork_depth_limit() {
        let sink = MemorySink::new();
        let mut log = LogHandle::builder(sink)
            .limits(Limits {
                max_fork_depth: 1,
                ..Limits::default()
            })
            .build()
            .unwrap();

        let mut first = log.fork(context! {}).unwrap();
        let mut second = first.fork(context! {}).unwrap();
        assert_eq!(second.fork_id().depth(), 1);

        let err = second.fork(context! {}).unwrap_err();
        assert_eq!(
            err,
            EngineError::ForkDepthExceeded {
                attempted: 2,
                max: 1
            }
        );
        assert_eq!(err.code(), ErrorCode::ForkDepthExceeded);

        // A failed fork does not consume an index
        let sibling = first.fork(context! {}).unwrap();
        assert_eq!(sibling.fork_id().to_string(), "1.2");
    }

    #[test]
    fn test_reserved_context_is_soft() {
        let sink = MemorySink::new();
        let mut log = root(&sink);
        let before = log.context();
        let outcome = log.add_context(context! { "event_key" => "x" });
        assert_eq!(outcome.reserved, vec!["event_key"]);
        assert_eq!(log.context(), before);
    }

    #[test]
    fn test_pending_diagnostics_attach_once() {
        let sink = MemorySink::new();
        let mut log = root(&sink);
        log.add_context(context! { "k" => 1 });
        log.add_context(context! { "k" => 2 });

        log.log(Level::Info, "first", fields! {});
        log.log(Level::Info, "second", fields! {});

        let records = sink.records();
        let first = records[0].payload.diagnostics.as_ref().unwrap();
        assert_eq!(first.collisions.len(), 1);
        assert!(records[1].payload.diagnostics.is_none());
    }

    #[test]
    fn test_pending_diagnostics_are_bounded() {
        let sink = MemorySink::new();
        let mut log = LogHandle::builder(sink.clone())
            .min_level(Level::Error)
            .build()
            .unwrap();
        log.add_context(context! { "user" => 0 });
        for i in 1..=100 {
            log.add_context(context! { "user" => i });
            log.log(Level::Info, "filtered", fields! {});
        }
        assert!(sink.is_empty());

        log.log(Level::Error, "failed", fields! {});
        let payload = sink.last().unwrap().payload;
        let diagnostics = payload.diagnostics.as_ref().unwrap();
        assert_eq!(diagnostics.collisions.len(), 64);
        assert_eq!(diagnostics.suppressed, 36);
        assert_eq!(payload.to_json()["_validation"]["suppressed"], json!(36));

        log.log(Level::Error, "again", fields! {});
        assert!(sink.last().unwrap().payload.diagnostics.is_none());
    }

    #[test]
    fn test_log_is_sanitized() {
        let sink = MemorySink::new();
        let mut log = root(&sink);
        log.log(
            Level::Warn,
            "user input:\nERROR forged",
            fields! { "raw" => "a\x1b[2Jb" },
        );

        let record = sink.last().unwrap();
        assert_eq!(record.message, "user input:\\nERROR forged");
        assert_eq!(record.payload.event_key, "log");
        assert_eq!(record.payload.fields["raw"], json!("ab"));
    }

    #[test]
    fn test_min_level_filters() {
        let sink = MemorySink::new();
        let mut log = LogHandle::builder(sink.clone())
            .min_level(Level::Warn)
            .build()
            .unwrap();
        log.log(Level::Info, "quiet", fields! {});
        log.log(Level::Error, "loud", fields! {});

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.last().unwrap().level, Level::Error);
        assert_eq!(log.stats().filtered, 1);
        assert_eq!(log.stats().delivered, 1);
    }

    #[test]
    fn test_sink_missing_levels_rejected() {
        let sink = LevelSink::new()
            .on(Level::Info, |_, _| {})
            .on(Level::Warn, |_, _| {});
        let err = LogHandle::builder(sink)
            .min_level(Level::Info)
            .build()
            .unwrap_err();
        match err {
            EngineError::UnsupportedSinkLevels { missing } => {
                assert!(missing.contains(&Level::Audit));
                assert!(missing.contains(&Level::Fatal));
                assert!(!missing.contains(&Level::Trace));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_partial_sink_accepted_above_minimum() {
        let sink = LevelSink::new()
            .on(Level::Error, |_, _| {})
            .on(Level::Alert, |_, _| {})
            .on(Level::Critical, |_, _| {})
            .on(Level::Fatal, |_, _| {});
        assert!(LogHandle::builder(sink).min_level(Level::Error).build().is_ok());
    }

    #[test]
    fn test_reserved_base_metadata_rejected() {
        let err = LogHandle::builder(MemorySink::new())
            .base_metadata(context! { "service" => "api", "timestamp" => 1 })
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::ReservedBaseMetadata {
                keys: vec!["timestamp".to_string()]
            }
        );
        assert_eq!(err.code(), ErrorCode::ReservedMetadataKey);
    }

    #[test]
    fn test_base_metadata_in_every_record() {
        let sink = MemorySink::new();
        let mut log = LogHandle::builder(sink.clone())
            .base_metadata(context! { "service" => "api" })
            .id_generator(IdGenerator::custom(|| "fixed".to_string()))
            .build()
            .unwrap();
        let mut child = log.fork(context! {}).unwrap();
        child.log(Level::Info, "x", fields! {});

        let record = sink.last().unwrap();
        assert_eq!(record.payload.metadata["service"], json!("api"));
        assert_eq!(record.payload.correlation_id, "fixed");
        assert_eq!(log.correlation_id(), "fixed");
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let err = LogHandle::builder(MemorySink::new())
            .limits(Limits {
                max_active_correlations: 0,
                ..Limits::default()
            })
            .build()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidSettings);
    }
}
