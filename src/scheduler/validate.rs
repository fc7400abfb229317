//! Per-file size checks run before edits are queued.

use crate::accounting::FileMap;
use crate::error::{OversizedFile, ValidationError};

/// Result of checking individual file sizes against a ceiling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeReport {
    /// Sorted by path.
    pub oversized: Vec<OversizedFile>,
}

impl SizeReport {
    pub fn is_clean(&self) -> bool {
        self.oversized.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.oversized.iter().any(|f| f.path == path)
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_clean() {
            Ok(())
        } else {
            Err(ValidationError::OversizedFiles(self.oversized))
        }
    }
}

/// List every file larger than `limit` bytes. Does not modify `files`.
pub fn check_file_sizes(files: &FileMap, limit: usize) -> SizeReport {
    let mut oversized: Vec<OversizedFile> = files
        .iter()
        .filter(|(_, content)| content.len() > limit)
        .map(|(path, content)| OversizedFile {
            path: path.clone(),
            size: content.len(),
            limit,
        })
        .collect();
    oversized.sort_by(|a, b| a.path.cmp(&b.path));
    SizeReport { oversized }
}

/// Split `files` into the ones within `limit` and a report of the rest.
pub fn partition_by_size(files: FileMap, limit: usize) -> (FileMap, SizeReport) {
    let report = check_file_sizes(&files, limit);
    if report.is_clean() {
        return (files, report);
    }
    let accepted = files
        .into_iter()
        .filter(|(_, content)| content.len() <= limit)
        .collect();
    (accepted, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(pairs: &[(&str, usize)]) -> FileMap {
        pairs
            .iter()
            .map(|(p, n)| (p.to_string(), "x".repeat(*n)))
            .collect()
    }

    #[test]
    fn reports_only_files_over_the_limit() {
        let set = files(&[("ok.js", 4), ("big.js", 5), ("huge.css", 9)]);
        let report = check_file_sizes(&set, 4);
        assert!(!report.is_clean());
        assert!(report.contains("big.js"));
        assert!(!report.contains("ok.js"));
        assert_eq!(report.oversized[0].path, "big.js");
        assert_eq!(report.oversized[1].size, 9);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn clean_report_converts_to_ok() {
        let report = check_file_sizes(&files(&[("a", 1)]), 4);
        assert!(report.clone().into_result().is_ok());
        assert!(report.is_clean());
    }

    #[test]
    fn dirty_report_converts_to_validation_error() {
        let err = check_file_sizes(&files(&[("a", 5)]), 4)
            .into_result()
            .unwrap_err();
        assert!(matches!(err, ValidationError::OversizedFiles(ref f) if f.len() == 1));
    }

    #[test]
    fn partition_keeps_small_files() {
        let (accepted, report) = partition_by_size(files(&[("a", 1), ("b", 10)]), 4);
        assert_eq!(accepted.len(), 1);
        assert!(accepted.contains_key("a"));
        assert!(report.contains("b"));
    }
}
