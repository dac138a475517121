//! Storage Tier Definitions
//!
//! Selects which backend(s) an operation targets and in which order
//! multi-tier reads consult them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Backend Kind
// =============================================================================

/// One physical storage area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Persistent store that survives restarts
    Durable,
    /// Per-session store, discarded when the session ends
    Volatile,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Durable => write!(f, "durable"),
            BackendKind::Volatile => write!(f, "volatile"),
        }
    }
}

// =============================================================================
// Storage Type
// =============================================================================

/// Tier selector for a single cache operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Durable backend only
    Durable,
    /// Volatile backend only
    Volatile,
    /// Both backends: writes go to both, reads prefer volatile
    #[default]
    Both,
}

impl StorageType {
    /// Resolve an explicit per-call selection against the configured default
    #[inline]
    pub fn resolve(explicit: Option<StorageType>, default: StorageType) -> StorageType {
        explicit.unwrap_or(default)
    }

    /// Backends consulted by a read, in priority order
    pub fn read_order(&self) -> &'static [BackendKind] {
        match self {
            StorageType::Durable => &[BackendKind::Durable],
            StorageType::Volatile => &[BackendKind::Volatile],
            StorageType::Both => &[BackendKind::Volatile, BackendKind::Durable],
        }
    }

    /// Backends touched by a write, remove, or clear
    pub fn write_targets(&self) -> &'static [BackendKind] {
        match self {
            StorageType::Durable => &[BackendKind::Durable],
            StorageType::Volatile => &[BackendKind::Volatile],
            StorageType::Both => &[BackendKind::Durable, BackendKind::Volatile],
        }
    }

    /// Check if this selection includes the given backend
    pub fn includes(&self, kind: BackendKind) -> bool {
        self.write_targets().contains(&kind)
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Durable => write!(f, "durable"),
            StorageType::Volatile => write!(f, "volatile"),
            StorageType::Both => write!(f, "both"),
        }
    }
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "durable" | "local" => Ok(StorageType::Durable),
            "volatile" | "session" => Ok(StorageType::Volatile),
            "both" | "all" => Ok(StorageType::Both),
            other => Err(format!("unknown storage type: {other}")),
        }
    }
}
