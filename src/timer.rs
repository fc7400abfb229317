//! Cancellable delayed actions on the tokio runtime.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Handle to an action scheduled with [`DelayedTask::schedule`].
///
/// Cancelling stops the action if it has not started yet. Dropping the handle
/// does NOT cancel; use [`DelayedTask::cancel`].
#[derive(Debug)]
pub struct DelayedTask {
    cancel: CancellationToken,
    deadline: Instant,
}

impl DelayedTask {
    /// Run `action` after `delay` unless cancelled first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(delay: Duration, action: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::schedule_at(Instant::now() + delay, action)
    }

    pub fn schedule_at<F>(deadline: Instant, action: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = tokio::time::sleep_until(deadline) => {
                    if !token.is_cancelled() {
                        action.await;
                    }
                }
            }
        });
        Self { cancel, deadline }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let start = Instant::now();
        let task = DelayedTask::schedule(Duration::from_millis(300), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(task.deadline(), start + Duration::from_millis(300));

        tokio::time::sleep(Duration::from_millis(299)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_never_fires() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let task = DelayedTask::schedule(Duration::from_millis(100), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.cancel();
        assert!(task.is_cancelled());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
