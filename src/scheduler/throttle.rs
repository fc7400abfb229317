//! Throttled "refresh needed" signaling.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::timer::DelayedTask;

/// What [`Throttler::signal`] did with a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The action ran immediately.
    Fired,
    /// A deferred firing was scheduled for the end of the interval.
    Deferred,
    /// A deferred firing was already pending and absorbs this signal.
    Coalesced,
}

/// Runs an action at most once per `interval`, never dropping a signal.
///
/// Must be used inside a tokio runtime.
pub struct Throttler {
    inner: Arc<ThrottleInner>,
}

struct ThrottleInner {
    interval: Duration,
    action: Box<dyn Fn() + Send + Sync>,
    state: Mutex<ThrottleState>,
}

#[derive(Default)]
struct ThrottleState {
    last_fired: Option<Instant>,
    deferred: Option<DelayedTask>,
    generation: u64,
}

impl Throttler {
    pub fn new<F>(interval: Duration, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(ThrottleInner {
                interval,
                action: Box::new(action),
                state: Mutex::new(ThrottleState::default()),
            }),
        }
    }

    pub fn signal(&self) -> SignalOutcome {
        let now = Instant::now();
        let mut state = self.inner.state.lock();
        if state.deferred.is_some() {
            return SignalOutcome::Coalesced;
        }

        let next_allowed = state.last_fired.map(|last| last + self.inner.interval);
        match next_allowed {
            Some(deadline) if deadline > now => {
                state.generation += 1;
                let generation = state.generation;
                let weak: Weak<ThrottleInner> = Arc::downgrade(&self.inner);
                state.deferred = Some(DelayedTask::schedule_at(deadline, async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.fire_deferred(generation);
                    }
                }));
                debug!(
                    delay_ms = (deadline - now).as_millis() as u64,
                    "deferred throttled signal"
                );
                SignalOutcome::Deferred
            }
            _ => {
                state.last_fired = Some(now);
                drop(state);
                (self.inner.action)();
                SignalOutcome::Fired
            }
        }
    }

    /// Drop a pending deferred firing. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        match state.deferred.take() {
            Some(task) => {
                task.cancel();
                true
            }
            None => false,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.inner.state.lock().deferred.is_some()
    }
}

impl Drop for Throttler {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl ThrottleInner {
    fn fire_deferred(&self, generation: u64) {
        {
            let mut state = self.state.lock();
            if state.generation != generation || state.deferred.is_none() {
                return;
            }
            state.deferred = None;
            state.last_fired = Some(Instant::now());
        }
        debug!("firing deferred throttled signal");
        (self.action)();
    }
}
