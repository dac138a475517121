//! Client Cache
//!
//! A two-tier key/value cache over a durable and a volatile string store,
//! with namespaced keys, hash-based change detection and optional
//! compression of stored values.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ClientCache                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐   │
//! │  │ Serializer   │  │ Change       │  │ Compression      │   │
//! │  │ (CacheValue) │  │ detection    │  │ (lz4/zstd/snap)  │   │
//! │  └──────────────┘  └──────────────┘  └──────────────────┘   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────┐  ┌─────────────────────────┐   │
//! │  │        Durable          │  │        Volatile         │   │
//! │  │   (FileStorage, ...)    │  │  (MemoryStorage, ...)   │   │
//! │  └─────────────────────────┘  └─────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: Cache facade, backends, codecs and options
//! - [`error`]: Error types and handling

pub mod cache;
pub mod error;

// Re-export commonly used types
pub use cache::{
    BackendKind, CacheEvent, CacheStatsSnapshot, CacheValue, ClearScope, ClientCache,
    CompressionAlgorithm, CompressionCodec, DataSource, FileStorage, MemoryStorage,
    PendingWrite, SharedBackend, StorageBackend, StorageOptions, StorageOptionsPatch,
    StorageType, TextEncoding, WriteOutcome,
};

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
