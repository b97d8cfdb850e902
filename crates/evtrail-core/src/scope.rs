//! Emission state shared by every kind of handle

use crate::config::LoggerSettings;
use crate::context::{ContextStore, ContextValidation};
use crate::error::{EngineError, EngineResult};
use crate::fork::ForkId;
use crate::ids::IdGenerator;
use crate::level::Level;
use crate::metrics::EngineStats;
use crate::payload::{Diagnostics, LogPayload, PayloadBuilder};
use crate::schema::EventSchema;
use crate::sink::Sink;
use crate::validate::{normalize_all, render_message, sanitize, validate, ValidationOptions};
use crate::value::{FieldMap, Fields};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Event key used for ad-hoc `log` records
pub const ADHOC_EVENT_KEY: &str = "log";

/// State owned by a root logger and shared with everything derived from it
pub(crate) struct Shared {
    pub sink: Arc<dyn Sink>,
    pub settings: LoggerSettings,
    pub ids: IdGenerator,
    pub active_correlations: AtomicUsize,
    pub stats: EngineStats,
}

impl Shared {
    fn options(&self) -> ValidationOptions {
        ValidationOptions {
            sanitize_strings: self.settings.sanitize_strings,
        }
    }

    /// Take a correlation slot, or fail without changing anything
    pub fn acquire_correlation(&self) -> EngineResult<()> {
        let limit = self.settings.limits.max_active_correlations;
        self.active_correlations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|active| EngineError::CorrelationLimitExceeded { active, limit })
    }

    pub fn release_correlation(&self) {
        let _ = self
            .active_correlations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn active_correlations(&self) -> usize {
        self.active_correlations.load(Ordering::SeqCst)
    }

    /// Hand a finished record to the sink
    pub fn deliver(&self, record: Outgoing) {
        EngineStats::incr(&self.stats.delivered);
        if let Some(diagnostics) = &record.payload.diagnostics {
            EngineStats::add(&self.stats.diagnostics, diagnostics.count());
        }
        self.sink.deliver(record.level, &record.message, &record.payload);
    }
}

/// A finished record waiting for delivery
pub(crate) struct Outgoing {
    pub level: Level,
    pub message: String,
    pub payload: LogPayload,
}

/// Correlation id, fork position and context of one handle
pub(crate) struct Scope {
    pub shared: Arc<Shared>,
    pub correlation_id: Arc<str>,
    pub fork_id: ForkId,
    pub context: ContextStore,
    forks: u32,
    /// Context diagnostics waiting for the next delivered record
    pending: ContextValidation,
    /// Pending entries that did not fit under the queue limit
    suppressed: usize,
}

impl Scope {
    pub fn root(shared: Arc<Shared>, context: ContextStore, pending: ContextValidation) -> Self {
        let correlation_id = Arc::from(shared.ids.generate());
        let mut scope = Self {
            shared,
            correlation_id,
            fork_id: ForkId::root(),
            context,
            forks: 0,
            pending: ContextValidation::default(),
            suppressed: 0,
        };
        scope.queue(pending);
        scope
    }

    fn is_filtered(&self, level: Level) -> bool {
        if level < self.shared.settings.min_level {
            EngineStats::incr(&self.shared.stats.filtered);
            return true;
        }
        false
    }

    /// Validate and deliver a typed event
    pub fn emit_event(&mut self, schema: &EventSchema, fields: Fields) {
        if let Some(record) = self.prepare_event(schema, fields) {
            self.shared.deliver(record);
        }
    }

    /// Deliver an untyped record
    pub fn emit_log(&mut self, level: Level, message: &str, fields: Fields) {
        if let Some(record) = self.prepare_log(level, message, fields) {
            self.shared.deliver(record);
        }
    }

    /// Build a typed event record, or `None` if its level is filtered
    pub fn prepare_event(&mut self, schema: &EventSchema, fields: Fields) -> Option<Outgoing> {
        if self.is_filtered(schema.level) {
            return None;
        }

        let validation = validate(schema, fields, self.shared.options());
        let diagnostics = self.take_pending().with_fields(&validation);
        let message = render_message(&schema.message, &validation.normalized_fields);

        Some(self.assemble(
            schema.level,
            &schema.key,
            message,
            validation.normalized_fields,
            diagnostics,
        ))
    }

    /// Build an untyped record, or `None` if its level is filtered
    pub fn prepare_log(&mut self, level: Level, message: &str, fields: Fields) -> Option<Outgoing> {
        if self.is_filtered(level) {
            return None;
        }

        let options = self.shared.options();
        let message = if options.sanitize_strings {
            sanitize(message)
        } else {
            message.to_string()
        };
        let fields = normalize_all(fields, options);
        let diagnostics = self.take_pending();

        Some(self.assemble(level, ADHOC_EVENT_KEY, message, fields, diagnostics))
    }

    fn take_pending(&mut self) -> Diagnostics {
        Diagnostics::default()
            .with_context(std::mem::take(&mut self.pending))
            .with_suppressed(std::mem::take(&mut self.suppressed))
    }

    fn assemble(
        &self,
        level: Level,
        event_key: &str,
        message: String,
        fields: FieldMap,
        diagnostics: Diagnostics,
    ) -> Outgoing {
        let payload = PayloadBuilder::new(event_key, &*self.correlation_id, self.fork_id.clone())
            .fields(fields)
            .metadata(self.context.snapshot())
            .diagnostics(diagnostics)
            .build();
        Outgoing {
            level,
            message,
            payload,
        }
    }

    /// Queue context diagnostics for the next record, up to the limit
    fn queue(&mut self, outcome: ContextValidation) {
        let limit = self.shared.settings.limits.max_pending_diagnostics;
        let discarded = self.pending.merge_bounded(outcome, limit);
        if discarded > 0 && self.suppressed == 0 {
            debug!(
                "Pending context diagnostics full at {}, counting the rest",
                limit
            );
        }
        self.suppressed += discarded;
    }

    /// Merge context and queue its diagnostics for the next record
    pub fn add_context<I, K, V>(&mut self, record: I) -> ContextValidation
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let outcome = self.context.add(record);
        self.queue(outcome.clone());
        outcome
    }

    /// Derive the next child scope of this one
    pub fn fork<I, K, V>(&mut self, extra: I) -> EngineResult<Scope>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let max = self.shared.settings.limits.max_fork_depth;
        let attempted = self.fork_id.child_depth();
        if attempted > max {
            return Err(EngineError::ForkDepthExceeded { attempted, max });
        }

        self.forks += 1;
        let fork_id = self.fork_id.child(self.forks);
        debug!("Forked {} from {}", fork_id, self.fork_id);

        let mut child = Scope {
            shared: Arc::clone(&self.shared),
            correlation_id: Arc::clone(&self.correlation_id),
            fork_id,
            context: ContextStore::seeded(self.context.snapshot(), self.context.max_keys()),
            forks: 0,
            pending: ContextValidation::default(),
            suppressed: 0,
        };
        child.add_context(extra);
        Ok(child)
    }

    /// Scope for a new correlation rooted at this scope's position.
    ///
    /// The caller must already hold a correlation slot.
    pub fn correlation<I, K, V>(&self, metadata: I) -> Scope
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut scope = Scope {
            shared: Arc::clone(&self.shared),
            correlation_id: Arc::from(self.shared.ids.generate()),
            fork_id: self.fork_id.clone(),
            context: ContextStore::seeded(self.context.snapshot(), self.context.max_keys()),
            forks: 0,
            pending: ContextValidation::default(),
            suppressed: 0,
        };
        scope.add_context(metadata);
        scope
    }
}
