//! Cache Entry Types
//!
//! Defines cache values, storage keys, and the string serialization used by
//! every backend.

use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Separator between the storage prefix and the caller's key
pub const KEY_SEPARATOR: char = '.';

// =============================================================================
// Storage Key
// =============================================================================

/// Build the physical key for a logical key under a prefix
#[inline]
pub fn storage_key(prefix: &str, key: &str) -> String {
    format!("{prefix}{KEY_SEPARATOR}{key}")
}

/// Check whether a physical key belongs to the namespace of `prefix`
pub fn in_namespace(prefix: &str, physical_key: &str) -> bool {
    physical_key
        .strip_prefix(prefix)
        .map(|rest| rest.starts_with(KEY_SEPARATOR))
        .unwrap_or(false)
}

// =============================================================================
// Cache Value
// =============================================================================

/// An application value accepted by the cache
///
/// The variant is chosen once at the API boundary; serialization dispatches
/// on it instead of probing the value at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    String(String),
    Number(Number),
    Bool(bool),
    Date(DateTime<Utc>),
    Object(Map<String, Value>),
    Array(Vec<Value>),
}

impl CacheValue {
    /// Build a number value; non-finite floats have no JSON form
    pub fn from_f64(value: f64) -> Option<Self> {
        Number::from_f64(value).map(CacheValue::Number)
    }

    /// Serialize to the string form handed to the compressor / backend
    pub fn serialize(&self) -> Result<String> {
        match self {
            CacheValue::String(text) => {
                // Text that would decode as JSON is quoted so it reads back as a string
                if serde_json::from_str::<Value>(text).is_ok() {
                    Ok(serde_json::to_string(text)?)
                } else {
                    Ok(text.clone())
                }
            }
            CacheValue::Number(n) => Ok(n.to_string()),
            CacheValue::Bool(b) => Ok(b.to_string()),
            CacheValue::Date(date) => Ok(iso_string(date)),
            CacheValue::Object(map) => Ok(serde_json::to_string(map)?),
            CacheValue::Array(items) => Ok(serde_json::to_string(items)?),
        }
    }

    /// Decode a stored string
    ///
    /// Text that is not JSON comes back verbatim as a string. A stored JSON
    /// `null` carries no value.
    pub fn deserialize(stored: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(stored) {
            Ok(value) => Self::from_json(value),
            Err(_) => Some(CacheValue::String(stored.to_string())),
        }
    }

    /// Convert a JSON value, mapping `null` to `None`
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(CacheValue::Bool(b)),
            Value::Number(n) => Some(CacheValue::Number(n)),
            Value::String(s) => Some(CacheValue::String(s)),
            Value::Array(items) => Some(CacheValue::Array(items)),
            Value::Object(map) => Some(CacheValue::Object(map)),
        }
    }

    /// Convert to a JSON value; dates become ISO-8601 strings
    pub fn to_json(&self) -> Value {
        match self {
            CacheValue::String(s) => Value::String(s.clone()),
            CacheValue::Number(n) => Value::Number(n.clone()),
            CacheValue::Bool(b) => Value::Bool(*b),
            CacheValue::Date(date) => Value::String(iso_string(date)),
            CacheValue::Object(map) => Value::Object(map.clone()),
            CacheValue::Array(items) => Value::Array(items.clone()),
        }
    }

    /// Get the string if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CacheValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the object map if this is an object value
    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            CacheValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Short name of the variant, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            CacheValue::String(_) => "string",
            CacheValue::Number(_) => "number",
            CacheValue::Bool(_) => "bool",
            CacheValue::Date(_) => "date",
            CacheValue::Object(_) => "object",
            CacheValue::Array(_) => "array",
        }
    }
}

/// ISO-8601 UTC with millisecond precision, e.g. `2024-01-02T03:04:05.678Z`
fn iso_string(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl fmt::Display for CacheValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheValue::String(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        CacheValue::String(value)
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        CacheValue::String(value.to_string())
    }
}

impl From<bool> for CacheValue {
    fn from(value: bool) -> Self {
        CacheValue::Bool(value)
    }
}

impl From<i64> for CacheValue {
    fn from(value: i64) -> Self {
        CacheValue::Number(value.into())
    }
}

impl From<u64> for CacheValue {
    fn from(value: u64) -> Self {
        CacheValue::Number(value.into())
    }
}

impl From<i32> for CacheValue {
    fn from(value: i32) -> Self {
        CacheValue::Number(value.into())
    }
}

impl From<DateTime<Utc>> for CacheValue {
    fn from(value: DateTime<Utc>) -> Self {
        CacheValue::Date(value)
    }
}

impl From<Map<String, Value>> for CacheValue {
    fn from(value: Map<String, Value>) -> Self {
        CacheValue::Object(value)
    }
}

impl From<Vec<Value>> for CacheValue {
    fn from(value: Vec<Value>) -> Self {
        CacheValue::Array(value)
    }
}

impl TryFrom<Value> for CacheValue {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_json(value).ok_or_else(|| Error::missing("value", "set"))
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// A value prepared for writing
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Caller-supplied key (unprefixed)
    pub key: String,
    /// Physical key under the prefix in force when the entry was built
    pub storage_key: String,
    /// Serialized form before compression
    pub serialized: String,
}

impl CacheEntry {
    /// Prepare a value for writing under `prefix`
    pub fn new(prefix: &str, key: &str, value: &CacheValue) -> Result<Self> {
        Ok(Self {
            key: key.to_string(),
            storage_key: storage_key(prefix, key),
            serialized: value.serialize()?,
        })
    }

    /// Serialized size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.serialized.len() as u64
    }
}
