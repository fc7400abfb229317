use thiserror::Error;

pub type Result<T> = std::result::Result<T, PreviewError>;

/// A single file rejected by the size validator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct OversizedFile {
    pub path: String,
    pub size: usize,
    pub limit: usize,
}

/// Malformed input, reported before any state change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("preview id is required")]
    MissingId,

    #[error("{} file(s) exceed the size limit: {}", .0.len(), oversized_paths(.0))]
    OversizedFiles(Vec<OversizedFile>),
}

fn oversized_paths(files: &[OversizedFile]) -> String {
    files
        .iter()
        .map(|f| format!("{} ({} > {} bytes)", f.path, f.size, f.limit))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreviewError {
    #[error("preview content is {size} bytes, exceeding the {cap} byte limit")]
    MemoryLimitExceeded { size: usize, cap: usize },

    #[error("preview '{id}' not found")]
    NotFound { id: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl PreviewError {
    /// Stable short code for transports that need to discriminate failures.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            PreviewError::MemoryLimitExceeded { .. } => "memory_limit_exceeded",
            PreviewError::NotFound { .. } => "not_found",
            PreviewError::Validation(_) => "validation_error",
        }
    }

    /// `NotFound` means "create it again"; everything else needs different input.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PreviewError::NotFound { .. })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_error_message_carries_size_and_cap() {
        let err = PreviewError::MemoryLimitExceeded { size: 12, cap: 10 };
        assert_eq!(
            err.to_string(),
            "preview content is 12 bytes, exceeding the 10 byte limit"
        );
        assert_eq!(err.code(), "memory_limit_exceeded");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn oversized_files_message_lists_paths() {
        let err: PreviewError = ValidationError::OversizedFiles(vec![OversizedFile {
            path: "big.js".to_string(),
            size: 9,
            limit: 4,
        }])
        .into();
        assert_eq!(err.code(), "validation_error");
        assert!(err.to_string().contains("big.js (9 > 4 bytes)"));
    }

    #[test]
    fn not_found_is_recoverable() {
        let err = PreviewError::NotFound {
            id: "p1".to_string(),
        };
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "preview 'p1' not found");
    }
}
