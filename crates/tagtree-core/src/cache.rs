//! Tag-aware cache store.
//!
//! Entries carry a set of labels. Invalidating a label purges every entry
//! saved with it, without knowing the entries' keys.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;

/// Key-value cache with label based invalidation.
pub trait TagAwareCache: Send + Sync {
    /// Cached value, `None` on a miss or when any of its labels was
    /// invalidated after the value was read.
    fn get(&self, key: &str) -> Option<Value>;

    /// Stamp to take before reading a value that will be passed to `set`.
    fn epoch(&self) -> u64;

    /// Save `value`, read no earlier than `read_at`. An invalidation of any
    /// of `tags` after `read_at` leaves the entry stale.
    fn set(&self, key: &str, value: Value, tags: &[String], read_at: u64);

    fn invalidate_tags(&self, tags: &[String]);

    fn clear(&self);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    tags: Vec<String>,
    read_at: u64,
}

/// Hit and miss counters of a [`MemoryTagCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Labels tracked before the version table is folded into its floor.
pub const DEFAULT_LABEL_CAPACITY: usize = 10_000;

/// In-process cache using label versions.
///
/// Every invalidation draws a new generation and stamps it on its labels.
/// An entry is fresh while none of its labels carries a generation newer
/// than the epoch taken before its value was read, so a write racing a
/// read-through leaves the entry stale instead of pinning the old value.
///
/// Labels without a version fall back to `floor`. Once more than
/// `label_capacity` labels are tracked, the table is dropped and the floor
/// raised to the current generation, which expires every older entry.
#[derive(Debug)]
pub struct MemoryTagCache {
    entries: DashMap<String, CacheEntry>,
    tag_versions: DashMap<String, u64>,
    generation: AtomicU64,
    floor: AtomicU64,
    label_capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for MemoryTagCache {
    fn default() -> Self {
        Self::with_label_capacity(DEFAULT_LABEL_CAPACITY)
    }
}

impl MemoryTagCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label_capacity(label_capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            tag_versions: DashMap::new(),
            generation: AtomicU64::new(0),
            floor: AtomicU64::new(0),
            label_capacity: label_capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn tag_version(&self, tag: &str) -> u64 {
        let floor = self.floor.load(Ordering::Acquire);
        self.tag_versions
            .get(tag)
            .map(|v| (*v).max(floor))
            .unwrap_or(floor)
    }

    /// Number of labels with a recorded invalidation.
    pub fn tracked_labels(&self) -> usize {
        self.tag_versions.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    fn miss(&self) -> Option<Value> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Fold the version table into the floor and drop the entries it expires.
    fn collapse_versions(&self, generation: u64) {
        self.floor.fetch_max(generation, Ordering::AcqRel);
        self.tag_versions.clear();
        self.entries.retain(|_, entry| entry.read_at >= generation);
    }
}

impl TagAwareCache for MemoryTagCache {
    fn get(&self, key: &str) -> Option<Value> {
        // Clone out so the shard lock is released before a possible removal.
        let entry = match self.entries.get(key).map(|e| e.value().clone()) {
            Some(entry) => entry,
            None => return self.miss(),
        };

        let fresh = entry
            .tags
            .iter()
            .all(|tag| self.tag_version(tag) <= entry.read_at);
        if !fresh {
            self.entries.remove(key);
            return self.miss();
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value)
    }

    fn epoch(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn set(&self, key: &str, value: Value, tags: &[String], read_at: u64) {
        let mut labels: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            if !labels.contains(tag) {
                labels.push(tag.clone());
            }
        }
        if labels.iter().any(|tag| self.tag_version(tag) > read_at) {
            // Invalidated while the value was being read.
            return;
        }
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                tags: labels,
                read_at,
            },
        );
    }

    fn invalidate_tags(&self, tags: &[String]) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        for tag in tags {
            self.tag_versions.insert(tag.clone(), generation);
        }
        if self.tag_versions.len() > self.label_capacity {
            self.collapse_versions(generation);
        }
    }

    fn clear(&self) {
        self.entries.clear();
    }
}
