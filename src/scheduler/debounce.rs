//! Debounced batching of file fragments.

use futures::FutureExt as _;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

use crate::accounting::FileMap;
use crate::timer::DelayedTask;

type BatchSink = Box<dyn Fn(FileMap) -> BoxFuture<'static, ()> + Send + Sync>;

/// Coalesces file fragments and hands the union to a sink once the input has
/// been quiet for `delay`.
///
/// Must be created and used inside a tokio runtime. Dropping the debouncer
/// discards unflushed edits.
pub struct Debouncer {
    inner: Arc<DebounceInner>,
}

struct DebounceInner {
    delay: Duration,
    sink: BatchSink,
    state: Mutex<DebounceState>,
    // Serializes sink invocations so batches land in the order they were taken.
    flush_lock: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct DebounceState {
    pending: FileMap,
    // Bumped on every push/flush/cancel; a timer only flushes if its generation
    // is still current when it takes the state lock.
    generation: u64,
    timer: Option<DelayedTask>,
}

impl Debouncer {
    pub fn new<F, Fut>(delay: Duration, sink: F) -> Self
    where
        F: Fn(FileMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            inner: Arc::new(DebounceInner {
                delay,
                sink: Box::new(move |files| sink(files).boxed()),
                state: Mutex::new(DebounceState::default()),
                flush_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Merge `fragment` into the pending set and restart the quiet period.
    pub fn push(&self, fragment: FileMap) {
        if fragment.is_empty() {
            return;
        }

        let mut state = self.inner.state.lock();
        state.pending.extend(fragment);
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }

        let generation = state.generation;
        let weak: Weak<DebounceInner> = Arc::downgrade(&self.inner);
        state.timer = Some(DelayedTask::schedule(self.inner.delay, async move {
            if let Some(inner) = weak.upgrade() {
                inner.flush(Some(generation)).await;
            }
        }));
    }

    /// Flush whatever is pending right away.
    pub async fn flush_now(&self) {
        self.inner.flush(None).await;
    }

    /// Drop pending edits and the running timer. Returns how many paths were discarded.
    pub fn cancel(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        let discarded = state.pending.len();
        state.pending.clear();
        discarded
    }

    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl DebounceInner {
    async fn flush(&self, expected_generation: Option<u64>) {
        let _serial = self.flush_lock.lock().await;

        let batch = {
            let mut state = self.state.lock();
            if let Some(generation) = expected_generation
                && generation != state.generation
            {
                return;
            }
            state.generation += 1;
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            if state.pending.is_empty() {
                return;
            }
            // Cleared before the sink runs so a failing sink never sees the
            // same edits twice.
            std::mem::take(&mut state.pending)
        };

        debug!(files = batch.len(), "flushing debounced batch");
        (self.sink)(batch).await;
    }
}
