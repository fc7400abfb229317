//! # preview-host
//!
//! In-memory store for live code previews.
//!
//! Each preview ("instance") is a project's generated files held in memory.
//! The store caps how many previews are resident and how large each may be,
//! evicting the least recently used one when a new preview needs room. Bursts
//! of edits (e.g. streamed code generation writing one file at a time) are
//! coalesced by the update scheduler before they touch the store.
//!
//! ```text
//! caller ──> PreviewManager ──────────────────────────────> InstanceStore
//!               │                                              ▲
//!               └─> StreamingUpdater                           │
//!                     ├─> size check                           │
//!                     ├─> Debouncer ─── flush ─────────────────┘
//!                     └─> RebuildGate ─> Throttler ─> RefreshRequested
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use preview_host::{FileMap, PreviewConfig, PreviewManager};
//!
//! let manager = PreviewManager::new(PreviewConfig::default());
//! let files = FileMap::from([("index.html".to_string(), "<h1>hi</h1>".to_string())]);
//! manager.create_preview("p1", "Demo", files)?;
//! assert_eq!(manager.get_status().instance_count, 1);
//! manager.dispose();
//! # Ok::<(), preview_host::PreviewError>(())
//! ```

mod accounting;
mod config;
mod error;
mod instance;
mod instance_store;
mod manager;
mod status;
mod timer;
mod updater;

pub mod scheduler;

pub use accounting::{ContentDigest, DigestMode, FileMap, content_digest, total_size};
pub use config::PreviewConfig;
pub use error::{ConfigError, OversizedFile, PreviewError, Result, ValidationError};
pub use instance::{FileOperation, FileUpdate, PreviewSnapshot, generate_preview_id};
pub use instance_store::{InstanceStore, StoreEvent};
pub use manager::PreviewManager;
pub use status::{InstanceStatus, ManagerStatus};
pub use timer::DelayedTask;
pub use updater::{StreamingUpdater, UpdaterEvent};
