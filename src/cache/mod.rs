//! Two-Tier Client Cache
//!
//! A key/value cache over two string stores:
//! - **Durable**: survives restarts (file-backed in the CLI)
//! - **Volatile**: lives as long as the session (in-memory)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         ClientCache                          │
//! │   set ──► serialize ──► queue ──┐        get / remove ◄──┐   │
//! ├─────────────────────────────────┼────────────────────────┼───┤
//! │                        ┌────────┴────────┐               │   │
//! │                        │  Writer task    │               │   │
//! │                        │ hash compare,   │               │   │
//! │                        │ compress, store │               │   │
//! │                        └────────┬────────┘               │   │
//! │          ┌──────────────────────┴───────────────────┐    │   │
//! │  ┌───────┴───────┐                          ┌───────┴────┴┐  │
//! │  │    Durable    │                          │  Volatile   │  │
//! │  └───────────────┘                          └─────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use client_cache::cache::{ClientCache, StorageType};
//!
//! let cache = ClientCache::in_memory()?;
//!
//! cache.set("user", "hello", None)?.await?;
//! assert_eq!(cache.get("user", None)?.unwrap().as_str(), Some("hello"));
//!
//! // Read-through
//! let value = cache
//!     .try_get_set("profile", &|| async { Ok(fetch_profile().await?.into()) })
//!     .await?;
//!
//! cache.remove("user", Some(StorageType::Volatile))?;
//! ```

pub mod compression;
pub mod entry;
pub mod events;
pub mod hash;
pub mod manager;
pub mod metrics;
pub mod options;
pub mod storage;
pub mod tier;
pub mod writer;

use async_trait::async_trait;
use std::future::Future;

// Re-export main types
pub use compression::{CompressionAlgorithm, CompressionCodec, TextCodec, TextEncoding};
pub use entry::{CacheEntry, CacheValue};
pub use events::CacheEvent;
pub use hash::{rolling_hash, same_content};
pub use manager::ClientCache;
pub use metrics::{CacheMetrics, CacheStatsSnapshot};
pub use options::{ClearScope, StorageOptions, StorageOptionsPatch};
pub use storage::{FileStorage, MemoryStorage, SharedBackend, StorageBackend};
pub use tier::{BackendKind, StorageType};
pub use writer::{PendingWrite, WriteOutcome};

/// Producer of a value for read-through caching
///
/// Any `Fn() -> impl Future<Output = anyhow::Result<CacheValue>>` closure
/// is a data source.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<CacheValue>;
}

#[async_trait]
impl<F, Fut> DataSource for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<CacheValue>> + Send,
{
    async fn fetch(&self) -> anyhow::Result<CacheValue> {
        (self)().await
    }
}
