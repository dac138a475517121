//! Cache Events
//!
//! Events emitted by the cache for monitoring and observability.

use crate::cache::options::ClearScope;
use crate::cache::tier::{BackendKind, StorageType};
use serde::{Deserialize, Serialize};

/// Events emitted by the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheEvent {
    /// Value was physically written
    Written {
        key: String,
        storage_type: StorageType,
        size_bytes: u64,
        compressed: bool,
    },

    /// Write skipped because the stored value already matched
    Unchanged {
        key: String,
        storage_type: StorageType,
    },

    /// Write failed in the background writer
    WriteFailed {
        key: String,
        storage_type: StorageType,
        error: String,
    },

    /// Value found
    Hit {
        key: String,
        backend: BackendKind,
    },

    /// No value in any consulted backend
    Miss {
        key: String,
    },

    /// Stored value could not be decoded with the current options
    Undecodable {
        key: String,
        backend: BackendKind,
        error: String,
    },

    /// Entry was removed
    Removed {
        key: String,
        storage_type: StorageType,
    },

    /// Backend(s) cleared
    Cleared {
        storage_type: StorageType,
        scope: ClearScope,
    },

    /// Options replaced
    Configured {
        storage_prefix: String,
        use_compression: bool,
    },

    /// Read-through fetch failed
    FetchFailed {
        key: String,
        error: String,
    },
}

impl CacheEvent {
    /// Create a Written event
    pub fn written(key: &str, storage_type: StorageType, size_bytes: u64, compressed: bool) -> Self {
        CacheEvent::Written {
            key: key.to_string(),
            storage_type,
            size_bytes,
            compressed,
        }
    }

    /// Create an Unchanged event
    pub fn unchanged(key: &str, storage_type: StorageType) -> Self {
        CacheEvent::Unchanged {
            key: key.to_string(),
            storage_type,
        }
    }

    /// Create a Hit event
    pub fn hit(key: &str, backend: BackendKind) -> Self {
        CacheEvent::Hit {
            key: key.to_string(),
            backend,
        }
    }

    /// Create a Miss event
    pub fn miss(key: &str) -> Self {
        CacheEvent::Miss {
            key: key.to_string(),
        }
    }

    /// Get the key associated with this event (if any)
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheEvent::Written { key, .. }
            | CacheEvent::Unchanged { key, .. }
            | CacheEvent::WriteFailed { key, .. }
            | CacheEvent::Hit { key, .. }
            | CacheEvent::Miss { key }
            | CacheEvent::Undecodable { key, .. }
            | CacheEvent::Removed { key, .. }
            | CacheEvent::FetchFailed { key, .. } => Some(key),
            CacheEvent::Cleared { .. } | CacheEvent::Configured { .. } => None,
        }
    }

    /// Check if this is an error event
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            CacheEvent::WriteFailed { .. }
                | CacheEvent::Undecodable { .. }
                | CacheEvent::FetchFailed { .. }
        )
    }
}
