//! In-Memory Storage
//!
//! DashMap-backed store. Serves as the volatile tier and as a stand-in for
//! any tier in tests; it counts physical writes so change detection can be
//! observed.

use crate::cache::storage::{item_size, StorageBackend};
use crate::error::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

// =============================================================================
// Memory Storage Configuration
// =============================================================================

/// Configuration for memory storage
#[derive(Debug, Clone)]
pub struct MemoryStorageConfig {
    /// Name reported in logs and errors
    pub name: String,
    /// Maximum bytes (keys + values) before writes are refused
    pub quota_bytes: Option<u64>,
    /// Number of shards for DashMap (0 = auto)
    pub shard_count: usize,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            quota_bytes: None,
            shard_count: 0,
        }
    }
}

// =============================================================================
// Memory Storage
// =============================================================================

/// In-memory string store backed by DashMap
pub struct MemoryStorage {
    name: String,
    entries: DashMap<String, String>,
    /// Current total size in bytes
    size_bytes: AtomicU64,
    quota_bytes: Option<u64>,
    /// When false every call fails as if storage were disabled
    available: AtomicBool,
    writes: AtomicU64,
    removals: AtomicU64,
    clears: AtomicU64,
}

impl MemoryStorage {
    /// Create new memory storage with default config
    pub fn new() -> Self {
        Self::with_config(MemoryStorageConfig::default())
    }

    /// Create new memory storage with a name
    pub fn named(name: impl Into<String>) -> Self {
        Self::with_config(MemoryStorageConfig {
            name: name.into(),
            ..Default::default()
        })
    }

    /// Create new memory storage with full config
    pub fn with_config(config: MemoryStorageConfig) -> Self {
        let entries = if config.shard_count > 0 {
            DashMap::with_shard_amount(config.shard_count)
        } else {
            DashMap::new()
        };

        Self {
            name: config.name,
            entries,
            size_bytes: AtomicU64::new(0),
            quota_bytes: config.quota_bytes,
            available: AtomicBool::new(true),
            writes: AtomicU64::new(0),
            removals: AtomicU64::new(0),
            clears: AtomicU64::new(0),
        }
    }

    /// Enable or disable the store
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Current size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Acquire)
    }

    /// Number of successful `set_item` calls
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of `remove_item` calls
    pub fn removal_count(&self) -> u64 {
        self.removals.load(Ordering::Relaxed)
    }

    /// Number of `clear` calls
    pub fn clear_count(&self) -> u64 {
        self.clears.load(Ordering::Relaxed)
    }

    /// Swap `old_size` for `new_size` in the running total, refusing to
    /// exceed the quota
    fn reserve(&self, old_size: u64, new_size: u64) -> Result<()> {
        let quota = self.quota_bytes.unwrap_or(u64::MAX);
        self.size_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = current.saturating_sub(old_size).saturating_add(new_size);
                (next <= quota).then_some(next)
            })
            .map(|_| ())
            .map_err(|current| Error::QuotaExceeded {
                backend: self.name.clone(),
                requested: new_size,
                available: quota.saturating_sub(current.saturating_sub(old_size)),
            })
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::unavailable(&self.name, "storage disabled"))
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self.entries.get(key).map(|r| r.value().clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.check_available()?;
        let new_size = item_size(key, value);

        // Holding the shard lock pins the old size of this key while the
        // total is reserved
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                self.reserve(item_size(key, occupied.get()), new_size)?;
                occupied.insert(value.to_string());
            }
            Entry::Vacant(vacant) => {
                self.reserve(0, new_size)?;
                vacant.insert(value.to_string());
            }
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.check_available()?;
        if let Some((k, v)) = self.entries.remove(key) {
            self.size_bytes.fetch_sub(item_size(&k, &v), Ordering::AcqRel);
        }
        self.removals.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.check_available()?;
        self.entries.clear();
        self.size_bytes.store(0, Ordering::Relaxed);
        self.clears.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.check_available()?;
        Ok(self.entries.iter().map(|r| r.key().clone()).collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
