//! Cache Options
//!
//! Immutable option snapshots plus the partial patch applied by
//! `configure`. Unset patch fields keep their current values.

use crate::cache::compression::CompressionCodec;
use crate::cache::tier::StorageType;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default namespace for stored keys
pub const DEFAULT_STORAGE_PREFIX: &str = "client-cache";

// =============================================================================
// Clear Scope
// =============================================================================

/// What `remove_all` deletes from each targeted backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearScope {
    /// Clear the whole backend, including keys of other namespaces
    #[default]
    Backend,
    /// Only delete keys under the configured prefix
    Prefix,
}

// =============================================================================
// Storage Options
// =============================================================================

/// Options in force for a cache instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    /// Namespace prepended to every key as `<prefix>.<key>`
    pub storage_prefix: String,
    /// Compress serialized values before storing them
    pub use_compression: bool,
    /// Tier used when an operation does not name one
    pub default_storage_type: StorageType,
    /// Codec used while compression is enabled
    pub codec: CompressionCodec,
    /// Scope of `remove_all`
    pub clear_scope: ClearScope,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            storage_prefix: DEFAULT_STORAGE_PREFIX.to_string(),
            use_compression: false,
            default_storage_type: StorageType::Both,
            codec: CompressionCodec::default(),
            clear_scope: ClearScope::Backend,
        }
    }
}

impl StorageOptions {
    /// Parse options from YAML; missing fields take defaults
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let options: StorageOptions = serde_yaml::from_str(yaml)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Check the options are usable
    pub fn validate(&self) -> Result<()> {
        if self.storage_prefix.is_empty() {
            return Err(Error::Configuration("storage_prefix must not be empty".into()));
        }
        Ok(())
    }

    /// Apply a patch, returning the merged options
    pub fn merged(&self, patch: &StorageOptionsPatch) -> Self {
        Self {
            storage_prefix: patch
                .storage_prefix
                .clone()
                .unwrap_or_else(|| self.storage_prefix.clone()),
            use_compression: patch.use_compression.unwrap_or(self.use_compression),
            default_storage_type: patch
                .default_storage_type
                .unwrap_or(self.default_storage_type),
            codec: patch.codec.unwrap_or(self.codec),
            clear_scope: patch.clear_scope.unwrap_or(self.clear_scope),
        }
    }
}

// =============================================================================
// Options Patch
// =============================================================================

/// Partial options accepted by `configure`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptionsPatch {
    pub storage_prefix: Option<String>,
    pub use_compression: Option<bool>,
    pub default_storage_type: Option<StorageType>,
    pub codec: Option<CompressionCodec>,
    pub clear_scope: Option<ClearScope>,
}

impl StorageOptionsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn storage_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.storage_prefix = Some(prefix.into());
        self
    }

    pub fn use_compression(mut self, enabled: bool) -> Self {
        self.use_compression = Some(enabled);
        self
    }

    pub fn default_storage_type(mut self, storage_type: StorageType) -> Self {
        self.default_storage_type = Some(storage_type);
        self
    }

    pub fn codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn clear_scope(mut self, scope: ClearScope) -> Self {
        self.clear_scope = Some(scope);
        self
    }

    /// Check whether the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl From<StorageOptions> for StorageOptionsPatch {
    fn from(options: StorageOptions) -> Self {
        Self {
            storage_prefix: Some(options.storage_prefix),
            use_compression: Some(options.use_compression),
            default_storage_type: Some(options.default_storage_type),
            codec: Some(options.codec),
            clear_scope: Some(options.clear_scope),
        }
    }
}
