//! Resettable single-shot idle timer
//!
//! Fires its callback once after `timeout` of inactivity. Every `touch`
//! re-arms it; `clear` cancels it for good. Timers run as Tokio tasks on the
//! runtime that was current when the timer was created, so they never keep
//! a host alive on their own.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Callback invoked when the timer fires
pub type TimeoutCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub struct IdleTimer {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    timeout: Duration,
    on_timeout: TimeoutCallback,
    runtime: Option<Handle>,
    state: Mutex<TimerState>,
}

#[derive(Default)]
struct TimerState {
    pending: Option<JoinHandle<()>>,
    /// Bumped on every arm/clear; a sleeping task only fires if it still
    /// holds the current generation.
    generation: u64,
    cleared: bool,
}

impl IdleTimer {
    /// Create a timer. A zero `timeout` disables firing permanently.
    pub fn new(timeout: Duration, on_timeout: impl Fn() + Send + Sync + 'static) -> Self {
        let runtime = if timeout.is_zero() {
            None
        } else {
            match Handle::try_current() {
                Ok(handle) => Some(handle),
                Err(_) => {
                    warn!("Idle timer created outside a Tokio runtime; it will never fire");
                    None
                }
            }
        };

        Self {
            inner: Arc::new(TimerInner {
                timeout,
                on_timeout: Box::new(on_timeout),
                runtime,
                state: Mutex::new(TimerState::default()),
            }),
        }
    }

    /// Arm the timer
    pub fn start(&self) {
        self.arm();
    }

    /// Re-arm the timer after activity
    pub fn touch(&self) {
        self.arm();
    }

    /// Cancel any pending fire and disable the timer
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.cleared = true;
        state.generation += 1;
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.inner.state.lock().pending.is_some()
    }

    pub fn is_cleared(&self) -> bool {
        self.inner.state.lock().cleared
    }

    /// Whether the timer can still fire at some point
    pub fn is_live(&self) -> bool {
        self.inner.runtime.is_some() && !self.is_cleared()
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    fn arm(&self) {
        let Some(runtime) = &self.inner.runtime else {
            return;
        };

        let mut state = self.inner.state.lock();
        if state.cleared {
            return;
        }
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
        state.generation += 1;

        let generation = state.generation;
        let inner = Arc::clone(&self.inner);
        state.pending = Some(runtime.spawn(async move {
            tokio::time::sleep(inner.timeout).await;
            inner.fire(generation);
        }));
    }
}

impl TimerInner {
    fn fire(&self, generation: u64) {
        {
            let mut state = self.state.lock();
            if state.cleared || state.generation != generation {
                return;
            }
            state.pending = None;
        }
        debug!("Idle timer fired after {:?}", self.timeout);
        (self.on_timeout)();
    }
}

impl fmt::Debug for IdleTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleTimer")
            .field("timeout", &self.inner.timeout)
            .field("armed", &self.is_armed())
            .field("cleared", &self.is_cleared())
            .finish()
    }
}
