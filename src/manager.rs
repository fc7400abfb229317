//! Public entry point: create, update, read and tear down previews.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::accounting::FileMap;
use crate::config::PreviewConfig;
use crate::error::{PreviewError, Result, ValidationError};
use crate::instance::{self, FileUpdate, PreviewSnapshot};
use crate::instance_store::{InstanceStore, StoreEvent};
use crate::scheduler::dispatch_batched;
use crate::status::ManagerStatus;
use crate::updater::{StreamingUpdater, UpdaterEvent};

/// Handle to the preview store. Clones share the same store.
#[derive(Clone)]
pub struct PreviewManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: PreviewConfig,
    store: InstanceStore,
}

impl PreviewManager {
    pub fn new(config: PreviewConfig) -> Self {
        let store = InstanceStore::new(config.max_instances, config.per_instance_memory_cap);
        info!(
            max_instances = config.max_instances,
            memory_cap = config.per_instance_memory_cap,
            "preview manager started"
        );
        Self {
            inner: Arc::new(ManagerInner { config, store }),
        }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.inner.config
    }

    pub fn create_preview(
        &self,
        id: &str,
        project_name: &str,
        files: FileMap,
    ) -> Result<PreviewSnapshot> {
        if id.trim().is_empty() {
            return Err(ValidationError::MissingId.into());
        }
        self.inner.store.admit(id, project_name, files)
    }

    pub fn create_preview_with_generated_id(
        &self,
        project_name: &str,
        files: FileMap,
    ) -> Result<PreviewSnapshot> {
        let id = instance::generate_preview_id();
        self.inner.store.admit(&id, project_name, files)
    }

    /// Set every file in `files` on the preview.
    pub fn update_preview(&self, id: &str, files: FileMap) -> Result<()> {
        let updates = files
            .into_iter()
            .map(|(path, content)| FileUpdate::set(path, content))
            .collect();
        self.apply_updates(id, updates)
    }

    /// Apply explicit create/update/delete edits, in order.
    pub fn apply_updates(&self, id: &str, updates: Vec<FileUpdate>) -> Result<()> {
        if id.trim().is_empty() {
            return Err(ValidationError::MissingId.into());
        }
        self.inner.store.mutate(id, updates)
    }

    pub fn get_preview(&self, id: &str) -> Option<PreviewSnapshot> {
        self.inner.store.read(id)
    }

    pub fn destroy_preview(&self, id: &str) {
        self.inner.store.remove(id);
    }

    pub fn get_status(&self) -> ManagerStatus {
        self.inner.store.snapshot()
    }

    /// Remove all previews. Safe to call repeatedly.
    pub fn dispose(&self) {
        let count = self.inner.store.clear();
        if count > 0 {
            info!(count, "disposed previews");
        }
    }

    /// Best-effort eviction and teardown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.store.subscribe()
    }

    /// Route bursty edits for `id` through the update scheduler.
    ///
    /// Must be called inside a tokio runtime.
    pub fn streaming_updater(
        &self,
        id: &str,
    ) -> (StreamingUpdater, mpsc::UnboundedReceiver<UpdaterEvent>) {
        StreamingUpdater::new(self.clone(), id.to_string())
    }

    /// Hand every file of a preview to `write`, `dispatch_batch_size` at a time.
    ///
    /// Files are visited in path order; each group of writes runs concurrently
    /// and the next group starts once the previous one is done. This is how an
    /// orchestrator pushes a preview into an external dev server or directory.
    pub async fn write_out<F, Fut, T>(&self, id: &str, mut write: F) -> Result<Vec<T>>
    where
        F: FnMut(String, String) -> Fut,
        Fut: Future<Output = T>,
    {
        let snapshot = self
            .get_preview(id)
            .ok_or_else(|| PreviewError::NotFound { id: id.to_string() })?;

        let mut entries: Vec<(String, String)> = snapshot
            .files
            .iter()
            .map(|(path, content)| (path.clone(), content.clone()))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let batch_size = self.inner.config.dispatch_batch_size;
        debug!(id, files = entries.len(), batch_size, "writing out preview");
        Ok(dispatch_batched(entries, batch_size, |(path, content)| write(path, content)).await)
    }

    /// Like `get_preview`, but leaves the preview's recency alone.
    pub fn peek_preview(&self, id: &str) -> Option<PreviewSnapshot> {
        self.inner.store.peek(id)
    }
}
