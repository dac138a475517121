//! Cache Storage Backends
//!
//! String key/value stores behind each tier.

mod file;
mod memory;

pub use file::{FileStorage, FileStorageConfig};
pub use memory::{MemoryStorage, MemoryStorageConfig};

use crate::error::Result;
use std::sync::Arc;

// =============================================================================
// StorageBackend Trait
// =============================================================================

/// Synchronous string key/value store
///
/// Mirrors the browser storage contract: every call completes before it
/// returns. Implementations are shared between caches and must tolerate
/// concurrent callers. Queued writes call in from tokio's blocking pool, so
/// `set_item` may block on disk I/O; reads and removals run on the caller's
/// thread and should stay cheap.
pub trait StorageBackend: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Get the value stored under `key`
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`; deleting a missing key is not an error
    fn remove_item(&self, key: &str) -> Result<()>;

    /// Delete every entry in this store
    fn clear(&self) -> Result<()>;

    /// All keys currently stored
    fn keys(&self) -> Result<Vec<String>>;

    /// Number of entries currently stored
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared handle to a backend
pub type SharedBackend = Arc<dyn StorageBackend>;

/// Bytes a key/value pair occupies against a quota
#[inline]
pub(crate) fn item_size(key: &str, value: &str) -> u64 {
    (key.len() + value.len()) as u64
}
