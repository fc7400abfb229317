//! LRU-bounded store of preview instances.
//!
//! One mutex guards the whole map, so admission and the eviction it may cause
//! are a single atomic step with respect to every other store operation.

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::accounting::{self, FileMap};
use crate::error::{PreviewError, Result};
use crate::instance::{FileUpdate, PreviewInstance, PreviewSnapshot};
use crate::status::{InstanceStatus, ManagerStatus};

/// Capacity-driven or explicit teardown, broadcast best-effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// Removed to make room for `admitted`.
    Evicted {
        id: String,
        project_name: String,
        memory_bytes: usize,
        admitted: String,
    },
    /// An admission reused an existing id.
    Replaced { id: String },
    Destroyed { id: String },
    Cleared { count: usize },
}

/// Thread-safe store of preview instances.
pub struct InstanceStore {
    instances: Mutex<LruCache<String, PreviewInstance>>,
    max_instances: usize,
    memory_cap: usize,
    events: broadcast::Sender<StoreEvent>,
}

impl InstanceStore {
    /// Create a store holding at most `max_instances` previews of at most
    /// `memory_cap` content bytes each.
    pub fn new(max_instances: usize, memory_cap: usize) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            // Capacity is enforced by `admit` so eviction can be logged and
            // reported; the cache itself only tracks recency order.
            instances: Mutex::new(LruCache::unbounded()),
            max_instances: max_instances.max(1),
            memory_cap,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Insert a new instance, evicting the least recently used one at capacity.
    ///
    /// An existing instance with the same id is replaced and does not cause an
    /// eviction.
    pub fn admit(&self, id: &str, project_name: &str, files: FileMap) -> Result<PreviewSnapshot> {
        let size = accounting::total_size(&files);
        if size > self.memory_cap {
            warn!(id, size, cap = self.memory_cap, "rejecting oversized preview");
            return Err(PreviewError::MemoryLimitExceeded {
                size,
                cap: self.memory_cap,
            });
        }

        let now = Instant::now();
        let instance = PreviewInstance::new(id.to_string(), project_name.to_string(), files, now);
        let snapshot = instance.snapshot();

        let mut evicted = None;
        let replaced = {
            let mut instances = self.instances.lock();
            let replaced = instances.pop(id).is_some();
            if !replaced && instances.len() >= self.max_instances {
                evicted = pick_victim(&instances).and_then(|victim| instances.pop(&victim));
            }
            instances.put(id.to_string(), instance);
            replaced
        };

        if replaced {
            debug!(id, "replaced existing preview");
            self.emit(StoreEvent::Replaced { id: id.to_string() });
        }
        if let Some(victim) = evicted {
            info!(
                evicted = %victim.id,
                admitted = id,
                memory_bytes = victim.memory_bytes,
                "evicted least recently used preview"
            );
            self.emit(StoreEvent::Evicted {
                id: victim.id,
                project_name: victim.project_name,
                memory_bytes: victim.memory_bytes,
                admitted: id.to_string(),
            });
        }
        debug!(id, project_name, size, "admitted preview");
        Ok(snapshot)
    }

    /// Apply `updates` atomically: either all of them land or none do.
    pub fn mutate(&self, id: &str, updates: Vec<FileUpdate>) -> Result<()> {
        let mut instances = self.instances.lock();
        let Some(instance) = instances.get_mut(id) else {
            return Err(PreviewError::NotFound { id: id.to_string() });
        };

        let projected = instance.projected_size(&updates);
        if projected > self.memory_cap {
            warn!(id, size = projected, cap = self.memory_cap, "rejecting preview update");
            return Err(PreviewError::MemoryLimitExceeded {
                size: projected,
                cap: self.memory_cap,
            });
        }

        let count = updates.len();
        instance.apply(updates);
        instance.touch(Instant::now());
        debug!(id, updates = count, memory_bytes = instance.memory_bytes, "updated preview");
        Ok(())
    }

    /// Get a copy of an instance, marking it as recently used.
    pub fn read(&self, id: &str) -> Option<PreviewSnapshot> {
        let mut instances = self.instances.lock();
        let instance = instances.get_mut(id)?;
        instance.touch(Instant::now());
        Some(instance.snapshot())
    }

    /// Get a copy of an instance without affecting recency.
    pub fn peek(&self, id: &str) -> Option<PreviewSnapshot> {
        self.instances.lock().peek(id).map(PreviewInstance::snapshot)
    }

    /// Remove an instance. Returns whether one was present.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.instances.lock().pop(id).is_some();
        if removed {
            debug!(id, "destroyed preview");
            self.emit(StoreEvent::Destroyed { id: id.to_string() });
        }
        removed
    }

    pub fn snapshot(&self) -> ManagerStatus {
        let now = Instant::now();
        let instances = self.instances.lock();
        let entries: Vec<InstanceStatus> = instances
            .iter()
            .map(|(_, inst)| InstanceStatus {
                id: inst.id.clone(),
                project_name: inst.project_name.clone(),
                age: now.saturating_duration_since(inst.created_at),
                idle_time: now.saturating_duration_since(inst.last_accessed_at),
                memory_usage: inst.memory_bytes,
            })
            .collect();

        ManagerStatus {
            instance_count: entries.len(),
            max_instances: self.max_instances,
            total_memory_bytes: entries.iter().map(|e| e.memory_usage).sum(),
            per_instance_memory_cap: self.memory_cap,
            instances: entries,
        }
    }

    /// Drop every instance. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let count = {
            let mut instances = self.instances.lock();
            let count = instances.len();
            instances.clear();
            count
        };
        if count > 0 {
            self.emit(StoreEvent::Cleared { count });
        }
        count
    }

    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Oldest `last_accessed_at`, ties by earliest `created_at`, then by LRU order.
fn pick_victim(instances: &LruCache<String, PreviewInstance>) -> Option<String> {
    // `iter()` runs most- to least-recent; reversing makes `min_by_key` keep the
    // least recent entry among equal keys.
    instances
        .iter()
        .rev()
        .min_by_key(|(_, inst)| (inst.last_accessed_at, inst.created_at))
        .map(|(id, _)| id.clone())
}
