//! File-Backed Storage
//!
//! Durable store kept as a single JSON document on local disk. The document
//! is loaded once on open and rewritten (write-then-rename) after every
//! mutation, so the store survives process restarts.

use crate::cache::storage::{item_size, StorageBackend};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// On-disk document version
const DOCUMENT_VERSION: u32 = 1;

// =============================================================================
// File Storage Configuration
// =============================================================================

/// Configuration for file storage
#[derive(Debug, Clone)]
pub struct FileStorageConfig {
    /// Directory holding the store document
    pub root_path: PathBuf,
    /// Store name; the document is `<root_path>/<name>.json`
    pub name: String,
    /// Maximum bytes (keys + values) before writes are refused
    pub quota_bytes: Option<u64>,
    /// Whether to fsync the document after each rewrite
    pub sync_writes: bool,
}

impl Default for FileStorageConfig {
    fn default() -> Self {
        Self {
            root_path: std::env::temp_dir().join("client-cache"),
            name: "durable".to_string(),
            quota_bytes: Some(5 * 1024 * 1024), // 5 MB, the usual per-origin allowance
            sync_writes: false,
        }
    }
}

/// Serialized form of the whole store
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredDocument {
    version: u32,
    entries: BTreeMap<String, String>,
}

// =============================================================================
// File Storage
// =============================================================================

/// Durable string store persisted to a JSON file
pub struct FileStorage {
    name: String,
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
    quota_bytes: Option<u64>,
    sync_writes: bool,
}

impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("entries", &self.entries.read().len())
            .field("quota_bytes", &self.quota_bytes)
            .finish()
    }
}

impl FileStorage {
    /// Open (or create) a store under `root_path` with default settings
    pub fn open(root_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(FileStorageConfig {
            root_path: root_path.into(),
            ..Default::default()
        })
    }

    /// Open (or create) a store with full config
    pub fn with_config(config: FileStorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.root_path)?;
        let path = config.root_path.join(format!("{}.json", config.name));
        let entries = Self::load(&path)?;

        debug!(path = %path.display(), entries = entries.len(), "Opened file storage");

        Ok(Self {
            name: config.name,
            path,
            entries: RwLock::new(entries),
            quota_bytes: config.quota_bytes,
            sync_writes: config.sync_writes,
        })
    }

    /// Path of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size in bytes
    pub fn size_bytes(&self) -> u64 {
        Self::total_size(&self.entries.read())
    }

    fn load(path: &Path) -> Result<BTreeMap<String, String>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let json = fs::read_to_string(path)?;
        let document: StoredDocument = serde_json::from_str(&json)?;
        if document.version != DOCUMENT_VERSION {
            return Err(Error::unavailable(
                path.display().to_string(),
                format!("unsupported document version {}", document.version),
            ));
        }
        Ok(document.entries)
    }

    fn total_size(entries: &BTreeMap<String, String>) -> u64 {
        entries.iter().map(|(k, v)| item_size(k, v)).sum()
    }

    /// Rewrite the document from the given entries
    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let document = StoredDocument {
            version: DOCUMENT_VERSION,
            entries: entries.clone(),
        };
        let json = serde_json::to_vec(&document)?;

        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&json)?;
        if self.sync_writes {
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn io_unavailable(&self, err: Error) -> Error {
        match err {
            Error::Io(e) => Error::unavailable(&self.name, e),
            other => other,
        }
    }
}

impl StorageBackend for FileStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write();

        if let Some(quota) = self.quota_bytes {
            let old_size = entries.get(key).map(|v| item_size(key, v)).unwrap_or(0);
            let remaining = Self::total_size(&entries).saturating_sub(old_size);
            let new_size = item_size(key, value);
            if remaining + new_size > quota {
                return Err(Error::QuotaExceeded {
                    backend: self.name.clone(),
                    requested: new_size,
                    available: quota.saturating_sub(remaining),
                });
            }
        }

        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&entries) {
            // Keep memory and disk in agreement
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(self.io_unavailable(e));
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write();
        if let Some(old) = entries.remove(key) {
            if let Err(e) = self.persist(&entries) {
                entries.insert(key.to_string(), old);
                return Err(self.io_unavailable(e));
            }
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut entries = self.entries.write();
        self.persist(&BTreeMap::new())
            .map_err(|e| self.io_unavailable(e))?;
        entries.clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

// =============================================================================
// Tests
// =============================================================================
