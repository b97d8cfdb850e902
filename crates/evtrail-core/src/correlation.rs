//! Correlation lifecycle
//!
//! A correlation is a handle bound to one correlation id and one idle timer.
//! It starts `Active` and reaches exactly one terminal state: `Completed`,
//! `Failed` or `TimedOut`. The shared active-correlation slot is released on
//! that first transition and never again.

use crate::context::{ContextRecord, ContextValidation};
use crate::error::EngineResult;
use crate::fork::ForkId;
use crate::handle::LogHandle;
use crate::level::Level;
use crate::metrics::EngineStats;
use crate::schema::{CorrelationEvents, CorrelationGroup, EventSchema};
use crate::scope::{Outgoing, Scope, Shared};
use crate::timer::IdleTimer;
use crate::value::{ErrorValue, FieldValue, Fields};
use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Lifecycle state of a correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStatus {
    Active,
    Completed,
    Failed,
    TimedOut,
}

impl CorrelationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CorrelationStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationStatus::Active => "active",
            CorrelationStatus::Completed => "completed",
            CorrelationStatus::Failed => "failed",
            CorrelationStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for CorrelationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct CorrelationState {
    scope: Scope,
    status: CorrelationStatus,
}

/// State shared by a correlation and every fork derived from it
pub(crate) struct CorrelationCore {
    auto: CorrelationEvents,
    started_at: Instant,
    timer: IdleTimer,
    shared: Arc<Shared>,
    correlation_id: Arc<str>,
    fork_id: ForkId,
    /// Held across build and delivery so records leave in call order.
    /// Re-entrant: a sink may log through the same correlation.
    delivery: ReentrantMutex<()>,
    state: Mutex<CorrelationState>,
    /// Strong self-reference while active, so an abandoned correlation
    /// still reaches its timeout
    keepalive: Mutex<Option<Arc<CorrelationCore>>>,
}

impl CorrelationCore {
    fn touch(&self) {
        self.timer.touch();
    }

    fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Build one record under the state lock and deliver it after
    fn emit(&self, build: impl FnOnce(&mut Scope) -> Option<Outgoing>) {
        let _order = self.delivery.lock();
        let record = build(&mut self.state.lock().scope);
        if let Some(record) = record {
            self.shared.deliver(record);
        }
    }

    /// Enter `terminal`: stop the timer and release the slot.
    ///
    /// Returns the keep-alive reference for the caller to drop.
    fn end(
        &self,
        state: &mut CorrelationState,
        terminal: CorrelationStatus,
    ) -> Option<Arc<CorrelationCore>> {
        state.status = terminal;
        self.timer.clear();
        self.shared.release_correlation();
        let counter = match terminal {
            CorrelationStatus::Failed => &self.shared.stats.correlations_failed,
            CorrelationStatus::TimedOut => &self.shared.stats.correlations_timed_out,
            _ => &self.shared.stats.correlations_completed,
        };
        EngineStats::incr(counter);
        self.keepalive.lock().take()
    }

    fn on_timeout(&self) {
        let released;
        let _order = self.delivery.lock();
        let record = {
            let mut state = self.state.lock();
            if state.status.is_terminal() {
                return;
            }
            released = self.end(&mut state, CorrelationStatus::TimedOut);

            let timeout_ms = self.timer.timeout().as_millis() as u64;
            debug!(
                "Correlation {} timed out after {}ms idle",
                self.correlation_id, timeout_ms
            );

            let mut fields = Fields::new();
            fields.insert("duration".to_string(), FieldValue::from(self.elapsed_ms()));
            fields.insert("timeout_ms".to_string(), FieldValue::from(timeout_ms));
            state.scope.prepare_event(&self.auto.timeout, fields)
        };
        if let Some(record) = record {
            self.shared.deliver(record);
        }
        drop(_order);
        drop(released);
    }

    /// The last handle to an active correlation went away
    fn on_abandoned(&self) {
        if self.state.lock().status.is_terminal() {
            return;
        }
        if self.timer.is_live() {
            debug!(
                "Correlation {} abandoned while active; it will time out",
                self.correlation_id
            );
        } else {
            warn!(
                "Correlation {} abandoned with no idle timeout; ending it now",
                self.correlation_id
            );
            self.on_timeout();
        }
    }

    /// Move to `terminal` if still active, then emit `schema`.
    ///
    /// Returns whether this call performed the transition.
    fn finish(
        &self,
        terminal: CorrelationStatus,
        schema: &EventSchema,
        mut fields: Fields,
        error: Option<ErrorValue>,
    ) -> bool {
        let mut released = None;
        let _order = self.delivery.lock();
        let (first, record) = {
            let mut state = self.state.lock();
            let first = state.status == CorrelationStatus::Active;

            if first {
                released = self.end(&mut state, terminal);
            } else {
                warn!(
                    "Correlation {} already {}, emitting {} again",
                    self.correlation_id, state.status, schema.key
                );
            }

            fields.insert("duration".to_string(), FieldValue::from(self.elapsed_ms()));
            if let Some(error) = error {
                fields.insert("error".to_string(), FieldValue::Error(error));
            }
            if !first {
                fields.insert("multiple_completes".to_string(), FieldValue::Bool(true));
            }
            (first, state.scope.prepare_event(schema, fields))
        };
        if let Some(record) = record {
            self.shared.deliver(record);
        }
        drop(_order);
        drop(released);
        first
    }
}

/// User-side reference to a correlation.
///
/// Held by the [`Correlation`] value and by every fork derived from it.
pub(crate) struct CorrelationLink {
    core: Arc<CorrelationCore>,
}

impl CorrelationLink {
    pub fn touch(&self) {
        self.core.touch();
    }
}

impl Drop for CorrelationLink {
    fn drop(&mut self) {
        self.core.on_abandoned();
    }
}

/// A tracked unit of work.
///
/// Cloning yields another reference to the same correlation. Dropping every
/// reference (including forks) without completing it leaves the idle
/// timeout to end it; with no timeout it ends at once as timed out.
#[derive(Clone)]
pub struct Correlation {
    link: Arc<CorrelationLink>,
}

impl Correlation {
    /// Emit `start` and arm the idle timer.
    ///
    /// `scope` must come from [`Scope::correlation`] with a slot already held.
    pub(crate) fn start(scope: Scope, group: &CorrelationGroup) -> Self {
        let shared = Arc::clone(&scope.shared);
        let correlation_id = Arc::clone(&scope.correlation_id);
        let fork_id = scope.fork_id.clone();

        let core = Arc::new_cyclic(|weak: &Weak<CorrelationCore>| {
            let weak = weak.clone();
            let timer = IdleTimer::new(group.timeout, move || {
                if let Some(core) = weak.upgrade() {
                    core.on_timeout();
                }
            });
            CorrelationCore {
                auto: group.auto.clone(),
                started_at: Instant::now(),
                timer,
                shared,
                correlation_id,
                fork_id,
                delivery: ReentrantMutex::new(()),
                state: Mutex::new(CorrelationState {
                    scope,
                    status: CorrelationStatus::Active,
                }),
                keepalive: Mutex::new(None),
            }
        });

        EngineStats::incr(&core.shared.stats.correlations_started);
        debug!(
            "Correlation {} started for {} at fork {}",
            core.correlation_id,
            group.key(),
            core.fork_id
        );
        core.emit(|scope| scope.prepare_event(&core.auto.start, Fields::new()));
        if core.timer.is_live() {
            *core.keepalive.lock() = Some(Arc::clone(&core));
        }
        core.timer.start();

        Self {
            link: Arc::new(CorrelationLink { core }),
        }
    }

    fn core(&self) -> &CorrelationCore {
        &self.link.core
    }

    /// Emit a typed event and reset the idle timer
    pub fn event(&self, schema: &EventSchema, fields: Fields) {
        self.core().touch();
        self.core().emit(|scope| scope.prepare_event(schema, fields));
    }

    /// Emit an untyped record and reset the idle timer
    pub fn log(&self, level: Level, message: &str, fields: Fields) {
        self.core().touch();
        self.core().emit(|scope| scope.prepare_log(level, message, fields));
    }

    /// Add metadata to the correlation's context.
    ///
    /// Each collision also emits a `metadata_warning` event.
    pub fn add_context<I, K, V>(&self, record: I) -> ContextValidation
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let core = self.core();
        core.touch();
        let _order = core.delivery.lock();
        let (outcome, warnings) = {
            let mut state = core.state.lock();
            let outcome = state.scope.add_context(record);

            let mut warnings = Vec::with_capacity(outcome.collisions.len());
            for collision in &outcome.collisions {
                let mut fields = Fields::new();
                fields.insert("key".to_string(), FieldValue::from(collision.key.as_str()));
                fields.insert(
                    "existing_value".to_string(),
                    FieldValue::String(as_text(&collision.existing_value)),
                );
                fields.insert(
                    "attempted_value".to_string(),
                    FieldValue::String(as_text(&collision.attempted_value)),
                );
                warnings.extend(state.scope.prepare_event(&core.auto.metadata_warning, fields));
            }
            (outcome, warnings)
        };

        for record in warnings {
            core.shared.deliver(record);
        }
        outcome
    }

    /// Fork a handle under this correlation.
    ///
    /// Activity on the fork, and on its own forks, keeps the correlation
    /// alive. Nested correlations are started from forks.
    pub fn fork<I, K, V>(&self, extra: I) -> EngineResult<LogHandle>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.core().touch();
        let scope = self.core().state.lock().scope.fork(extra)?;
        Ok(LogHandle::from_scope(scope, Some(Arc::clone(&self.link))))
    }

    /// Finish successfully.
    ///
    /// Returns `true` if this call ended the correlation. Later calls emit
    /// `complete` again, marked with `multiple_completes`.
    pub fn complete(&self, fields: Fields) -> bool {
        let core = self.core();
        core.finish(CorrelationStatus::Completed, &core.auto.complete, fields, None)
    }

    /// Finish with an error
    pub fn fail(&self, error: impl Into<ErrorValue>, fields: Fields) -> bool {
        let core = self.core();
        core.finish(
            CorrelationStatus::Failed,
            &core.auto.fail,
            fields,
            Some(error.into()),
        )
    }

    pub fn status(&self) -> CorrelationStatus {
        self.core().state.lock().status
    }

    pub fn is_active(&self) -> bool {
        self.status() == CorrelationStatus::Active
    }

    pub fn correlation_id(&self) -> &str {
        &self.core().correlation_id
    }

    pub fn fork_id(&self) -> &ForkId {
        &self.core().fork_id
    }

    /// Snapshot of the correlation's context
    pub fn context(&self) -> ContextRecord {
        self.core().state.lock().scope.context.snapshot()
    }

    /// Time since the correlation started
    pub fn elapsed(&self) -> Duration {
        self.core().started_at.elapsed()
    }

    pub fn timeout(&self) -> Duration {
        self.core().timer.timeout()
    }
}

impl fmt::Debug for Correlation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlation")
            .field("correlation_id", &self.core().correlation_id)
            .field("fork_id", &self.core().fork_id.to_string())
            .field("status", &self.status())
            .field("timeout", &self.core().timer.timeout())
            .finish()
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
