//! Preview instance records and the edits applied to them.

use std::sync::Arc;
use tokio::time::Instant;

use crate::accounting::{self, FileMap};

/// Kind of edit carried by a [`FileUpdate`].
///
/// `Create` and `Update` both set the path; the distinction is only a hint
/// from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Create,
    Update,
    Delete,
}

/// A single edit to a preview's files.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileUpdate {
    pub path: String,
    #[serde(default)]
    pub content: Option<String>,
    pub operation: FileOperation,
}

impl FileUpdate {
    pub fn set(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(content.into()),
            operation: FileOperation::Update,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
            operation: FileOperation::Delete,
        }
    }

    /// Content this edit leaves at `path`, `None` for a deletion.
    pub(crate) fn resulting_content(&self) -> Option<&str> {
        match self.operation {
            FileOperation::Delete => None,
            FileOperation::Create | FileOperation::Update => {
                Some(self.content.as_deref().unwrap_or(""))
            }
        }
    }
}

/// Generate a fresh preview id.
pub fn generate_preview_id() -> String {
    format!("preview-{}", uuid::Uuid::new_v4())
}

/// Resident preview, owned by the instance store.
#[derive(Debug, Clone)]
pub(crate) struct PreviewInstance {
    pub(crate) id: String,
    pub(crate) project_name: String,
    pub(crate) files: Arc<FileMap>,
    pub(crate) created_at: Instant,
    pub(crate) last_accessed_at: Instant,
    pub(crate) memory_bytes: usize,
}

impl PreviewInstance {
    pub(crate) fn new(id: String, project_name: String, files: FileMap, now: Instant) -> Self {
        let memory_bytes = accounting::total_size(&files);
        Self {
            id,
            project_name,
            files: Arc::new(files),
            created_at: now,
            last_accessed_at: now,
            memory_bytes,
        }
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        // Never move backwards, even if a caller supplies a stale instant.
        if now > self.last_accessed_at {
            self.last_accessed_at = now;
        }
    }

    /// Size of `files` after applying `updates`, without touching `files`.
    pub(crate) fn projected_size(&self, updates: &[FileUpdate]) -> usize {
        // Last write per path wins, so only the final edit of each path matters.
        let mut last: std::collections::HashMap<&str, Option<&str>> =
            std::collections::HashMap::with_capacity(updates.len());
        for update in updates {
            last.insert(update.path.as_str(), update.resulting_content());
        }

        let mut size = self.memory_bytes;
        for (path, content) in last {
            if let Some(old) = self.files.get(path) {
                size -= old.len();
            }
            if let Some(new) = content {
                size += new.len();
            }
        }
        size
    }

    /// Apply `updates` in order. Callers check the size budget first.
    pub(crate) fn apply(&mut self, updates: Vec<FileUpdate>) {
        let files = Arc::make_mut(&mut self.files);
        for update in updates {
            match update.operation {
                FileOperation::Delete => {
                    files.remove(&update.path);
                }
                FileOperation::Create | FileOperation::Update => {
                    files.insert(update.path, update.content.unwrap_or_default());
                }
            }
        }
        self.memory_bytes = accounting::total_size(files);
    }

    pub(crate) fn snapshot(&self) -> PreviewSnapshot {
        PreviewSnapshot {
            id: self.id.clone(),
            project_name: self.project_name.clone(),
            files: Arc::clone(&self.files),
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
            memory_bytes: self.memory_bytes,
        }
    }
}

/// Caller-owned view of an instance at the moment it was read.
///
/// Files are shared copy-on-write with the store: later mutations of the
/// instance never show up in an existing snapshot.
#[derive(Debug, Clone)]
pub struct PreviewSnapshot {
    pub id: String,
    pub project_name: String,
    pub files: Arc<FileMap>,
    pub created_at: Instant,
    pub last_accessed_at: Instant,
    pub memory_bytes: usize,
}
