//! Size and digest helpers over file maps.
//!
//! Everything here is pure; the store and the scheduler call into it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Relative path -> file content.
pub type FileMap = HashMap<String, String>;

/// Total content size of a file map in bytes (paths are not counted).
pub fn total_size(files: &FileMap) -> usize {
    files.values().map(String::len).sum()
}

/// How [`content_digest`] fingerprints a file set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DigestMode {
    /// Sorted `path:len` tuples. Cheap, but two edits that keep every length
    /// identical produce the same digest.
    #[default]
    Length,
    /// SHA-256 over sorted paths and full contents. Exact, scans every byte.
    Content,
}

impl DigestMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "length" => Some(DigestMode::Length),
            "content" => Some(DigestMode::Content),
            _ => None,
        }
    }
}

/// Approximate identity of a file set, compared between rebuild checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn content_digest(files: &FileMap, mode: DigestMode) -> ContentDigest {
    let mut entries: Vec<(&String, &String)> = files.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

    match mode {
        DigestMode::Length => {
            let mut out = String::new();
            for (path, content) in entries {
                out.push_str(path);
                out.push(':');
                out.push_str(&content.len().to_string());
                out.push('|');
            }
            ContentDigest(out)
        }
        DigestMode::Content => {
            let mut hasher = Sha256::new();
            for (path, content) in entries {
                // Length prefixes keep ("ab","c") and ("a","bc") apart.
                hasher.update((path.len() as u64).to_le_bytes());
                hasher.update(path.as_bytes());
                hasher.update((content.len() as u64).to_le_bytes());
                hasher.update(content.as_bytes());
            }
            ContentDigest(hex::encode(hasher.finalize()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(pairs: &[(&str, &str)]) -> FileMap {
        pairs
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn total_size_counts_utf8_bytes() {
        assert_eq!(total_size(&FileMap::new()), 0);
        assert_eq!(total_size(&files(&[("a", "abc"), ("b", "é")])), 5);
    }

    #[test]
    fn length_digest_is_order_independent() {
        let a = files(&[("src/a.ts", "1"), ("src/b.ts", "22")]);
        let mut b = FileMap::new();
        b.insert("src/b.ts".to_string(), "xy".to_string());
        b.insert("src/a.ts".to_string(), "z".to_string());

        let da = content_digest(&a, DigestMode::Length);
        assert_eq!(da.as_str(), "src/a.ts:1|src/b.ts:2|");
        assert_eq!(da, content_digest(&b, DigestMode::Length));
    }

    #[test]
    fn length_digest_misses_same_length_edits() {
        let a = files(&[("a", "one")]);
        let b = files(&[("a", "two")]);
        assert_eq!(
            content_digest(&a, DigestMode::Length),
            content_digest(&b, DigestMode::Length)
        );
        assert_ne!(
            content_digest(&a, DigestMode::Content),
            content_digest(&b, DigestMode::Content)
        );
    }

    #[test]
    fn content_digest_separates_path_boundaries() {
        let a = files(&[("ab", "c")]);
        let b = files(&[("a", "bc")]);
        assert_ne!(
            content_digest(&a, DigestMode::Content),
            content_digest(&b, DigestMode::Content)
        );
    }

    #[test]
    fn digest_mode_parse() {
        assert_eq!(DigestMode::parse(" Content "), Some(DigestMode::Content));
        assert_eq!(DigestMode::parse("length"), Some(DigestMode::Length));
        assert_eq!(DigestMode::parse("crc"), None);
    }
}
