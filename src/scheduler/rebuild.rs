//! Rebuild suppression for file sets whose digest has not changed.

use parking_lot::Mutex;

use crate::accounting::{self, ContentDigest, DigestMode, FileMap};

/// Skips rebuilds when the file set's digest has not changed since the last check.
pub struct RebuildGate {
    mode: DigestMode,
    last: Mutex<Option<ContentDigest>>,
}

impl RebuildGate {
    pub fn new(mode: DigestMode) -> Self {
        Self {
            mode,
            last: Mutex::new(None),
        }
    }

    /// Record the digest of `files`; true when it differs from the previous call.
    pub fn needs_rebuild(&self, files: &FileMap) -> bool {
        let digest = accounting::content_digest(files, self.mode);
        let mut last = self.last.lock();
        if last.as_ref() == Some(&digest) {
            return false;
        }
        *last = Some(digest);
        true
    }

    /// Forget the last digest so the next check always asks for a rebuild.
    pub fn reset(&self) {
        *self.last.lock() = None;
    }
}
