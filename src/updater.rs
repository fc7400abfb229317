//! Streaming updates for one preview.
//!
//! Edits pushed here go through the size validator and the debouncer before
//! they reach the store. After each flush the rebuild gate decides whether the
//! preview's file set changed enough to ask for a refresh, and refresh requests
//! are throttled.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::accounting::FileMap;
use crate::error::PreviewError;
use crate::manager::PreviewManager;
use crate::scheduler::{Debouncer, RebuildGate, SizeReport, Throttler, partition_by_size};

/// Reported on the updater's channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdaterEvent {
    /// A debounced batch was applied (or rejected) by the store.
    Flushed {
        id: String,
        files: usize,
        result: Result<(), PreviewError>,
    },
    /// The preview's content changed; the consumer should rebuild/reload it.
    RefreshRequested { id: String },
}

/// Handle for pushing bursty edits to a single preview.
pub struct StreamingUpdater {
    id: String,
    max_file_size: usize,
    debouncer: Debouncer,
    throttler: Arc<Throttler>,
}

impl StreamingUpdater {
    /// Create an updater and its event receiver. Must be called inside a tokio runtime.
    pub(crate) fn new(
        manager: PreviewManager,
        id: String,
    ) -> (Self, mpsc::UnboundedReceiver<UpdaterEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = manager.config().clone();

        let refresh_tx = tx.clone();
        let refresh_id = id.clone();
        let throttler = Arc::new(Throttler::new(config.throttle_interval(), move || {
            debug!(id = %refresh_id, "requesting preview refresh");
            let _ = refresh_tx.send(UpdaterEvent::RefreshRequested {
                id: refresh_id.clone(),
            });
        }));

        let gate = Arc::new(RebuildGate::new(config.digest_mode));
        let sink_id = id.clone();
        let sink_throttler = throttler.clone();
        let debouncer = Debouncer::new(config.debounce_delay(), move |batch: FileMap| {
            let manager = manager.clone();
            let id = sink_id.clone();
            let gate = gate.clone();
            let throttler = sink_throttler.clone();
            let tx = tx.clone();
            async move {
                let files = batch.len();
                let result = manager.update_preview(&id, batch);
                if let Err(err) = &result {
                    warn!(id = %id, error = %err, "streamed update rejected");
                }

                let changed = result.is_ok()
                    && manager
                        .peek_preview(&id)
                        .is_some_and(|snapshot| gate.needs_rebuild(&snapshot.files));

                let _ = tx.send(UpdaterEvent::Flushed {
                    id: id.clone(),
                    files,
                    result,
                });
                if changed {
                    throttler.signal();
                }
            }
        });

        (
            Self {
                id,
                max_file_size: config.max_file_size_bytes,
                debouncer,
                throttler,
            },
            rx,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue `files` for the next flush.
    ///
    /// Files over the size ceiling are left out and listed in the returned
    /// report; the rest are queued.
    pub fn push(&self, files: FileMap) -> SizeReport {
        let (accepted, report) = partition_by_size(files, self.max_file_size);
        for file in &report.oversized {
            warn!(
                id = %self.id,
                path = %file.path,
                size = file.size,
                limit = file.limit,
                "skipping oversized file"
            );
        }
        self.debouncer.push(accepted);
        report
    }

    /// Apply queued edits now instead of waiting for the quiet period.
    pub async fn flush_now(&self) {
        self.debouncer.flush_now().await;
    }

    /// Drop queued edits and any pending refresh. Returns how many paths were discarded.
    pub fn cancel(&self) -> usize {
        self.throttler.cancel();
        self.debouncer.cancel()
    }

    pub fn pending_len(&self) -> usize {
        self.debouncer.pending_len()
    }
}
