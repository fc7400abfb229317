//! Tunables for the store and the update scheduler.
//!
//! Values come from defaults, then an optional JSON file, then environment
//! variables. Out-of-range numbers are clamped rather than rejected.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::accounting::DigestMode;
use crate::error::ConfigError;

const MIB: usize = 1024 * 1024;

pub const DEFAULT_MAX_INSTANCES: usize = 3;
pub const DEFAULT_MEMORY_CAP: usize = 100 * MIB;
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_THROTTLE_MS: u64 = 1000;
pub const DEFAULT_MAX_FILE_SIZE: usize = 5 * MIB;
pub const DEFAULT_DISPATCH_BATCH: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub max_instances: usize,
    pub per_instance_memory_cap: usize,
    pub debounce_delay_ms: u64,
    pub throttle_interval_ms: u64,
    pub max_file_size_bytes: usize,
    pub dispatch_batch_size: usize,
    pub digest_mode: DigestMode,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_instances: DEFAULT_MAX_INSTANCES,
            per_instance_memory_cap: DEFAULT_MEMORY_CAP,
            debounce_delay_ms: DEFAULT_DEBOUNCE_MS,
            throttle_interval_ms: DEFAULT_THROTTLE_MS,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            dispatch_batch_size: DEFAULT_DISPATCH_BATCH,
            digest_mode: DigestMode::Length,
        }
    }
}

impl PreviewConfig {
    /// Read a JSON config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config: PreviewConfig = serde_json::from_str(&data)?;
        Ok(config.normalized())
    }

    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `PREVIEW_*` environment variables on top of `self`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PREVIEW_MAX_INSTANCES").and_then(|v| v.trim().parse().ok()) {
            self.max_instances = v;
        }
        if let Some(v) = get("PREVIEW_MEMORY_CAP_BYTES").and_then(|v| v.trim().parse().ok()) {
            self.per_instance_memory_cap = v;
        }
        if let Some(v) = get("PREVIEW_DEBOUNCE_MS").and_then(|v| v.trim().parse().ok()) {
            self.debounce_delay_ms = v;
        }
        if let Some(v) = get("PREVIEW_THROTTLE_MS").and_then(|v| v.trim().parse().ok()) {
            self.throttle_interval_ms = v;
        }
        if let Some(v) = get("PREVIEW_MAX_FILE_BYTES").and_then(|v| v.trim().parse().ok()) {
            self.max_file_size_bytes = v;
        }
        if let Some(v) = get("PREVIEW_DISPATCH_BATCH").and_then(|v| v.trim().parse().ok()) {
            self.dispatch_batch_size = v;
        }
        if let Some(v) = get("PREVIEW_DIGEST_MODE").and_then(|v| DigestMode::parse(&v)) {
            self.digest_mode = v;
        }
        self.normalized()
    }

    fn normalized(mut self) -> Self {
        self.max_instances = self.max_instances.max(1);
        self.dispatch_batch_size = self.dispatch_batch_size.max(1);
        self
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_delay_ms)
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }
}
