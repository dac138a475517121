//! Client Cache Manager
//!
//! The storage facade: resolves tiers, reconciles writes against what is
//! already stored, and serves reads and read-through fetches over a durable
//! and a volatile backend.

use crate::cache::compression::TextCodec;
use crate::cache::entry::{in_namespace, storage_key, CacheEntry, CacheValue};
use crate::cache::events::CacheEvent;
use crate::cache::hash::same_content;
use crate::cache::metrics::{CacheMetrics, CacheStatsSnapshot};
use crate::cache::options::{ClearScope, StorageOptions, StorageOptionsPatch};
use crate::cache::storage::{MemoryStorage, SharedBackend, StorageBackend};
use crate::cache::tier::{BackendKind, StorageType};
use crate::cache::writer::{self, PendingWrite, WriteJob, WriteOutcome};
use crate::cache::DataSource;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

/// Capacity of the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

fn require_key(key: &str, function: &'static str) -> Result<()> {
    if key.is_empty() {
        Err(Error::missing("key", function))
    } else {
        Ok(())
    }
}

// =============================================================================
// Cache Core
// =============================================================================

/// State shared between the facade and its writer task
pub(crate) struct CacheCore {
    durable: SharedBackend,
    volatile: SharedBackend,
    metrics: CacheMetrics,
    event_tx: broadcast::Sender<CacheEvent>,
}

impl CacheCore {
    fn backend(&self, kind: BackendKind) -> &dyn StorageBackend {
        match kind {
            BackendKind::Durable => self.durable.as_ref(),
            BackendKind::Volatile => self.volatile.as_ref(),
        }
    }

    fn emit(&self, event: CacheEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Find the stored text for a physical key, honoring the tier read order
    fn read(&self, physical_key: &str, storage_type: StorageType) -> Result<Option<(BackendKind, String)>> {
        for kind in storage_type.read_order() {
            if let Some(stored) = self.backend(*kind).get_item(physical_key)? {
                return Ok(Some((*kind, stored)));
            }
        }
        Ok(None)
    }

    /// Write an entry unless the currently stored value hashes equal
    pub(crate) fn apply_write(
        &self,
        entry: &CacheEntry,
        storage_type: StorageType,
        options: &StorageOptions,
    ) -> Result<WriteOutcome> {
        let codec = TextCodec::new(options.codec);

        if let Some((_, existing)) = self.read(&entry.storage_key, storage_type)? {
            // An entry stored under another codec epoch never matches
            let current = if options.use_compression {
                codec.decompress(&existing).ok()
            } else {
                Some(existing)
            };

            if current.is_some_and(|current| same_content(&current, &entry.serialized)) {
                self.metrics.record_unchanged();
                self.emit(CacheEvent::unchanged(&entry.storage_key, storage_type));
                debug!(key = %entry.storage_key, tier = %storage_type, "Cache value unchanged, write skipped");
                return Ok(WriteOutcome::Unchanged);
            }
        }

        let stored = if options.use_compression {
            codec.compress(&entry.serialized)?
        } else {
            entry.serialized.clone()
        };

        for kind in storage_type.write_targets() {
            self.backend(*kind).set_item(&entry.storage_key, &stored)?;
        }

        self.metrics.record_write();
        self.emit(CacheEvent::written(
            &entry.storage_key,
            storage_type,
            stored.len() as u64,
            options.use_compression,
        ));
        debug!(
            key = %entry.storage_key,
            tier = %storage_type,
            size = stored.len(),
            compressed = options.use_compression,
            "Stored cache value"
        );

        Ok(WriteOutcome::Written)
    }

    pub(crate) fn write_failed(&self, storage_key: &str, storage_type: StorageType, error: &Error) {
        self.metrics.record_write_failure();
        self.emit(CacheEvent::WriteFailed {
            key: storage_key.to_string(),
            storage_type,
            error: error.to_string(),
        });
    }
}

// =============================================================================
// Client Cache
// =============================================================================

/// Two-tier key/value cache facade
pub struct ClientCache {
    core: Arc<CacheCore>,
    /// Current options; replaced whole on `configure`
    options: RwLock<Arc<StorageOptions>>,
    write_tx: mpsc::UnboundedSender<WriteJob>,
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache")
            .field("durable", &self.core.durable.name())
            .field("volatile", &self.core.volatile.name())
            .field("options", &*self.options.read())
            .finish()
    }
}

impl ClientCache {
    /// Create a cache over the given backends with default options
    pub fn new(durable: SharedBackend, volatile: SharedBackend) -> Result<Arc<Self>> {
        Self::with_options(durable, volatile, StorageOptions::default())
    }

    /// Create a cache over in-memory backends
    pub fn in_memory() -> Result<Arc<Self>> {
        Self::new(
            Arc::new(MemoryStorage::named("durable")),
            Arc::new(MemoryStorage::named("volatile")),
        )
    }

    /// Create a cache with custom options
    ///
    /// Must be called inside a tokio runtime; the writer task is spawned here.
    pub fn with_options(
        durable: SharedBackend,
        volatile: SharedBackend,
        options: StorageOptions,
    ) -> Result<Arc<Self>> {
        options.validate()?;

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let core = Arc::new(CacheCore {
            durable,
            volatile,
            metrics: CacheMetrics::new(),
            event_tx,
        });
        let write_tx = writer::spawn(core.clone())?;

        info!(
            prefix = %options.storage_prefix,
            compression = options.use_compression,
            default_tier = %options.default_storage_type,
            durable = core.durable.name(),
            volatile = core.volatile.name(),
            "Client cache initialized"
        );

        Ok(Arc::new(Self {
            core,
            options: RwLock::new(Arc::new(options)),
            write_tx,
        }))
    }

    /// Current options snapshot
    pub fn options(&self) -> Arc<StorageOptions> {
        self.options.read().clone()
    }

    /// Subscribe to cache events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.core.event_tx.subscribe()
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.core.metrics.snapshot()
    }

    /// Merge a patch into the options; later operations see the result
    pub fn configure(&self, patch: StorageOptionsPatch) -> Result<()> {
        let merged = {
            let mut current = self.options.write();
            let merged = current.merged(&patch);
            merged.validate()?;
            *current = Arc::new(merged.clone());
            merged
        };

        info!(
            prefix = %merged.storage_prefix,
            compression = merged.use_compression,
            codec = %merged.codec,
            default_tier = %merged.default_storage_type,
            "Client cache reconfigured"
        );
        self.core.emit(CacheEvent::Configured {
            storage_prefix: merged.storage_prefix,
            use_compression: merged.use_compression,
        });
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Queue a write of `value` under `key`
    ///
    /// Argument errors are returned immediately. The returned handle resolves
    /// once the write has run, including when change detection skipped it.
    pub fn set(
        &self,
        key: &str,
        value: impl Into<CacheValue>,
        storage_type: Option<StorageType>,
    ) -> Result<PendingWrite> {
        require_key(key, "set")?;
        let value: CacheValue = value.into();

        let options = self.options();
        let storage_type = StorageType::resolve(storage_type, options.default_storage_type);
        let entry = CacheEntry::new(&options.storage_prefix, key, &value)?;

        debug!(key = %entry.storage_key, tier = %storage_type, kind = value.kind(), "Queueing cache write");

        let (done, rx) = oneshot::channel();
        self.write_tx
            .send(WriteJob::Write {
                entry,
                storage_type,
                options,
                done,
            })
            .map_err(|_| Error::Internal("cache writer is not running".into()))?;

        Ok(PendingWrite::new(rx))
    }

    /// Queue a write of a JSON value; `null` is rejected as a missing value
    pub fn set_json(
        &self,
        key: &str,
        value: serde_json::Value,
        storage_type: Option<StorageType>,
    ) -> Result<PendingWrite> {
        require_key(key, "set")?;
        let value = CacheValue::try_from(value)?;
        self.set(key, value, storage_type)
    }

    /// Queue a write of any serializable value
    pub fn set_serialized<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        storage_type: Option<StorageType>,
    ) -> Result<PendingWrite> {
        self.set_json(key, serde_json::to_value(value)?, storage_type)
    }

    /// Wait until every write queued before this call has run
    pub async fn flush(&self) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.write_tx
            .send(WriteJob::Flush { done })
            .map_err(|_| Error::Internal("cache writer is not running".into()))?;
        rx.await
            .map_err(|_| Error::Internal("cache writer stopped during flush".into()))
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Read the value under `key`; `Ok(None)` when nothing usable is stored
    pub fn get(&self, key: &str, storage_type: Option<StorageType>) -> Result<Option<CacheValue>> {
        require_key(key, "get")?;

        let options = self.options();
        let storage_type = StorageType::resolve(storage_type, options.default_storage_type);
        let physical_key = storage_key(&options.storage_prefix, key);

        let Some((backend, stored)) = self.core.read(&physical_key, storage_type)? else {
            self.core.metrics.record_miss();
            self.core.emit(CacheEvent::miss(&physical_key));
            return Ok(None);
        };

        let serialized = if options.use_compression {
            match TextCodec::new(options.codec).decompress(&stored) {
                Ok(text) => text,
                Err(e) => {
                    warn!(key = %physical_key, backend = %backend, error = %e, "Stored value is not decodable with current options");
                    self.core.metrics.record_undecodable();
                    self.core.emit(CacheEvent::Undecodable {
                        key: physical_key,
                        backend,
                        error: e.to_string(),
                    });
                    return Ok(None);
                }
            }
        } else {
            stored
        };

        self.core.metrics.record_hit();
        self.core.emit(CacheEvent::hit(&physical_key, backend));
        Ok(CacheValue::deserialize(&serialized))
    }

    /// Read and deserialize into `T`
    pub fn get_as<T: DeserializeOwned>(
        &self,
        key: &str,
        storage_type: Option<StorageType>,
    ) -> Result<Option<T>> {
        match self.get(key, storage_type)? {
            Some(value) => Ok(Some(serde_json::from_value(value.to_json())?)),
            None => Ok(None),
        }
    }

    /// Read-through: return the cached value, or fetch, cache and return it
    pub async fn try_get_set<S>(&self, key: &str, source: &S) -> Result<CacheValue>
    where
        S: DataSource + ?Sized,
    {
        self.try_get_set_with(key, source, |value| value).await
    }

    /// Read-through with a transform applied to the cached or fetched value
    ///
    /// On a miss `source` is invoked exactly once and its result is written
    /// under the default tier before `map` runs. Fetch failures propagate;
    /// there is no stale-value fallback.
    pub async fn try_get_set_with<S, M, T>(&self, key: &str, source: &S, map: M) -> Result<T>
    where
        S: DataSource + ?Sized,
        M: FnOnce(CacheValue) -> T,
    {
        require_key(key, "try_get_set")?;

        if let Some(cached) = self.get(key, Some(StorageType::Both))? {
            debug!(key = %key, "Read-through served from cache");
            return Ok(map(cached));
        }

        self.core.metrics.record_fetch();
        let fetched = match source.fetch().await {
            Ok(value) => value,
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(key = %key, error = %reason, "Read-through fetch failed");
                self.core.metrics.record_fetch_failure();
                self.core.emit(CacheEvent::FetchFailed {
                    key: key.to_string(),
                    error: reason.clone(),
                });
                return Err(Error::Fetch {
                    key: key.to_string(),
                    reason,
                });
            }
        };

        self.set(key, fetched.clone(), None)?.await?;
        Ok(map(fetched))
    }

    // -------------------------------------------------------------------------
    // Removal
    // -------------------------------------------------------------------------

    /// Delete `key` from the resolved tier(s)
    pub fn remove(&self, key: &str, storage_type: Option<StorageType>) -> Result<()> {
        require_key(key, "remove")?;

        let options = self.options();
        let storage_type = StorageType::resolve(storage_type, options.default_storage_type);
        let physical_key = storage_key(&options.storage_prefix, key);

        for kind in storage_type.write_targets() {
            self.core.backend(*kind).remove_item(&physical_key)?;
        }

        self.core.metrics.record_removal();
        self.core.emit(CacheEvent::Removed {
            key: physical_key.clone(),
            storage_type,
        });
        debug!(key = %physical_key, tier = %storage_type, "Removed cache value");
        Ok(())
    }

    /// Clear the resolved tier(s)
    ///
    /// With [`ClearScope::Backend`] every key in the backend goes, including
    /// keys written by other namespaces sharing it.
    pub fn remove_all(&self, storage_type: Option<StorageType>) -> Result<()> {
        let options = self.options();
        let storage_type = StorageType::resolve(storage_type, options.default_storage_type);

        for kind in storage_type.write_targets() {
            let backend = self.core.backend(*kind);
            match options.clear_scope {
                ClearScope::Backend => backend.clear()?,
                ClearScope::Prefix => {
                    for key in backend.keys()? {
                        if in_namespace(&options.storage_prefix, &key) {
                            backend.remove_item(&key)?;
                        }
                    }
                }
            }
        }

        self.core.metrics.record_clear();
        self.core.emit(CacheEvent::Cleared {
            storage_type,
            scope: options.clear_scope,
        });
        info!(tier = %storage_type, scope = ?options.clear_scope, "Cleared cache storage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::compression::{CompressionAlgorithm, CompressionCodec, TextEncoding};
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        cache: Arc<ClientCache>,
        durable: Arc<MemoryStorage>,
        volatile: Arc<MemoryStorage>,
    }

    fn harness_with(options: StorageOptions) -> Harness {
        let durable = Arc::new(MemoryStorage::named("durable"));
        let volatile = Arc::new(MemoryStorage::named("volatile"));
        let cache = ClientCache::with_options(durable.clone(), volatile.clone(), options).unwrap();
        Harness {
            cache,
            durable,
            volatile,
        }
    }

    fn harness() -> Harness {
        harness_with(StorageOptions::default())
    }

    /// Durable store whose writes block until the test releases them
    struct GatedStorage {
        inner: MemoryStorage,
        gate: parking_lot::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl StorageBackend for GatedStorage {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn get_item(&self, key: &str) -> Result<Option<String>> {
            self.inner.get_item(key)
        }

        fn set_item(&self, key: &str, value: &str) -> Result<()> {
            self.gate
                .lock()
                .recv_timeout(std::time::Duration::from_secs(2))
                .map_err(|_| Error::unavailable("gated", "write was never released"))?;
            self.inner.set_item(key, value)
        }

        fn remove_item(&self, key: &str) -> Result<()> {
            self.inner.remove_item(key)
        }

        fn clear(&self) -> Result<()> {
            self.inner.clear()
        }

        fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys()
        }

        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    fn counting_source(
        calls: Arc<AtomicUsize>,
        value: CacheValue,
    ) -> impl Fn() -> futures::future::Ready<anyhow::Result<CacheValue>> + Send + Sync {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(value.clone()))
        }
    }

    #[tokio::test]
    async fn test_set_and_get_string() {
        let h = harness();

        let outcome = h.cache.set("k", "hello", None).unwrap().await.unwrap();
        assert_eq!(outcome, WriteOutcome::Written);

        assert_eq!(h.cache.get("k", None).unwrap(), Some(CacheValue::from("hello")));
        assert_eq!(
            h.durable.get_item("client-cache.k").unwrap().as_deref(),
            Some("hello")
        );
        assert_eq!(
            h.volatile.get_item("client-cache.k").unwrap().as_deref(),
            Some("hello")
        );
    }

    #[tokio::test]
    async fn test_set_and_get_object() {
        let h = harness();

        h.cache.set_json("k", json!({"a": 1}), None).unwrap().await.unwrap();
        let value = h.cache.get("k", None).unwrap().unwrap();
        assert_eq!(value.to_json(), json!({"a": 1}));

        #[derive(serde::Deserialize, serde::Serialize, Debug, PartialEq)]
        struct Profile {
            prop: String,
            truth: bool,
            h: u32,
        }
        let profile = Profile {
            prop: "hello".into(),
            truth: false,
            h: 5,
        };
        h.cache.set_serialized("val", &profile, None).unwrap().await.unwrap();
        assert_eq!(h.cache.get_as::<Profile>("val", None).unwrap(), Some(profile));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let h = harness();
        assert_eq!(h.cache.get("missing", None).unwrap(), None);
        assert_eq!(h.cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_date_reads_back_as_iso_string() {
        let h = harness();
        let date = chrono::Utc::now();

        h.cache.set("ab", date, None).unwrap().await.unwrap();
        let value = h.cache.get("ab", None).unwrap().unwrap();
        assert_eq!(
            value.as_str(),
            Some(date.to_rfc3339_opts(chrono::SecondsFormat::Millis, true).as_str())
        );
    }

    #[tokio::test]
    async fn test_argument_errors_are_synchronous() {
        let h = harness();

        assert_matches!(
            h.cache.set("", "value", None),
            Err(Error::MissingArgument { parameter: "key", function: "set" })
        );
        assert_matches!(
            h.cache.set_json("legitKey", serde_json::Value::Null, None),
            Err(Error::MissingArgument { parameter: "value", .. })
        );
        assert_matches!(
            h.cache.get("", None),
            Err(Error::MissingArgument { parameter: "key", function: "get" })
        );
        assert_matches!(h.cache.remove("", None), Err(Error::MissingArgument { .. }));
    }

    #[tokio::test]
    async fn test_identical_value_written_once() {
        let h = harness_with(StorageOptions {
            default_storage_type: StorageType::Durable,
            ..Default::default()
        });

        let first = h.cache.set("k", json!({"a": 1}).as_object().unwrap().clone(), None).unwrap();
        let second = h.cache.set("k", json!({"a": 1}).as_object().unwrap().clone(), None).unwrap();
        assert_eq!(first.await.unwrap(), WriteOutcome::Written);
        assert_eq!(second.await.unwrap(), WriteOutcome::Unchanged);
        assert_eq!(h.durable.write_count(), 1);

        let third = h.cache.set_json("k", json!({"a": 2}), None).unwrap();
        assert_eq!(third.await.unwrap(), WriteOutcome::Written);
        assert_eq!(h.durable.write_count(), 2);

        let stats = h.cache.stats();
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.unchanged, 1);
    }

    #[tokio::test]
    async fn test_write_is_deferred_until_flush() {
        let h = harness();

        let _pending = h.cache.set("k", "later", None).unwrap();
        assert_eq!(h.cache.get("k", None).unwrap(), None);

        h.cache.flush().await.unwrap();
        assert_eq!(h.cache.get("k", None).unwrap(), Some(CacheValue::from("later")));
    }

    #[tokio::test]
    async fn test_writes_run_in_call_order() {
        let h = harness();

        for i in 0..10 {
            let _ = h.cache.set("counter", i, None).unwrap();
        }
        h.cache.flush().await.unwrap();
        assert_eq!(h.cache.get("counter", None).unwrap(), Some(CacheValue::from(9)));
        assert_eq!(h.durable.write_count(), 10);
    }

    #[tokio::test]
    async fn test_both_reads_prefer_volatile() {
        let h = harness();

        h.durable.set_item("client-cache.k", "durable").unwrap();
        assert_eq!(h.cache.get("k", None).unwrap(), Some(CacheValue::from("durable")));

        h.volatile.set_item("client-cache.k", "volatile").unwrap();
        assert_eq!(h.cache.get("k", None).unwrap(), Some(CacheValue::from("volatile")));
        assert_eq!(
            h.cache.get("k", Some(StorageType::Durable)).unwrap(),
            Some(CacheValue::from("durable"))
        );
    }

    #[tokio::test]
    async fn test_single_tier_write() {
        let h = harness();

        h.cache.set("k", "v", Some(StorageType::Volatile)).unwrap().await.unwrap();
        assert_eq!(h.volatile.len(), 1);
        assert!(h.durable.is_empty());
    }

    #[tokio::test]
    async fn test_remove_is_tier_scoped() {
        let h = harness();
        h.cache.set("item", "s", None).unwrap().await.unwrap();

        h.cache.remove("item", Some(StorageType::Volatile)).unwrap();
        assert_eq!(h.volatile.get_item("client-cache.item").unwrap(), None);
        assert_eq!(
            h.durable.get_item("client-cache.item").unwrap().as_deref(),
            Some("s")
        );
        // Falls back to durable
        assert_eq!(h.cache.get("item", None).unwrap(), Some(CacheValue::from("s")));

        h.cache.set("item", "s", Some(StorageType::Volatile)).unwrap().await.unwrap();
        h.cache.remove("item", Some(StorageType::Durable)).unwrap();
        assert_eq!(h.durable.get_item("client-cache.item").unwrap(), None);
        assert!(h.volatile.get_item("client-cache.item").unwrap().is_some());

        h.cache.remove("item", None).unwrap();
        assert_eq!(h.cache.get("item", None).unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_all_clears_whole_backends() {
        let h = harness();
        h.cache.set("item", "s", None).unwrap().await.unwrap();
        h.durable.set_item("other-app.item", "x").unwrap();

        h.cache.remove_all(None).unwrap();
        assert!(h.durable.is_empty());
        assert!(h.volatile.is_empty());
        assert_eq!(h.durable.clear_count(), 1);
        assert_eq!(h.volatile.clear_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_all_single_tier() {
        let h = harness();
        h.cache.set("item", "s", None).unwrap().await.unwrap();

        h.cache.remove_all(Some(StorageType::Volatile)).unwrap();
        assert!(h.volatile.is_empty());
        assert_eq!(h.durable.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_all_prefix_scope() {
        let h = harness_with(StorageOptions {
            clear_scope: ClearScope::Prefix,
            ..Default::default()
        });
        h.cache.set("item", "s", None).unwrap().await.unwrap();
        h.durable.set_item("other-app.item", "x").unwrap();

        h.cache.remove_all(None).unwrap();
        assert_eq!(h.durable.keys().unwrap(), vec!["other-app.item".to_string()]);
        assert!(h.volatile.is_empty());
    }

    #[tokio::test]
    async fn test_configure_changes_namespace() {
        let h = harness();
        h.cache.set("k", "old", None).unwrap().await.unwrap();

        h.cache
            .configure(StorageOptionsPatch::new().storage_prefix("someOtherPrefix"))
            .unwrap();
        assert_eq!(h.cache.options().storage_prefix, "someOtherPrefix");
        assert!(!h.cache.options().use_compression);
        assert_eq!(h.cache.get("k", None).unwrap(), None);

        h.cache.set("k", "new", None).unwrap().await.unwrap();
        assert!(h.durable.get_item("someOtherPrefix.k").unwrap().is_some());
        assert_eq!(
            h.durable.get_item("client-cache.k").unwrap().as_deref(),
            Some("old")
        );
    }

    #[tokio::test]
    async fn test_configure_rejects_invalid_prefix() {
        let h = harness();
        assert_matches!(
            h.cache.configure(StorageOptionsPatch::new().storage_prefix("")),
            Err(Error::Configuration(_))
        );
        assert_eq!(h.cache.options().storage_prefix, "client-cache");
    }

    #[tokio::test]
    async fn test_configure_accepts_dotted_prefix() {
        let h = harness();

        h.cache
            .configure(StorageOptionsPatch::new().storage_prefix("app.v2"))
            .unwrap();
        assert_eq!(h.cache.options().storage_prefix, "app.v2");

        h.cache.set("k", "scoped", None).unwrap().await.unwrap();
        assert_eq!(
            h.durable.get_item("app.v2.k").unwrap().as_deref(),
            Some("scoped")
        );
        assert_eq!(h.cache.get("k", None).unwrap(), Some(CacheValue::from("scoped")));

        h.cache.remove("k", None).unwrap();
        assert_eq!(h.cache.get("k", None).unwrap(), None);
    }

    #[tokio::test]
    async fn test_compression_stores_smaller_and_round_trips() {
        let h = harness();
        h.cache
            .configure(StorageOptionsPatch::new().use_compression(true))
            .unwrap();

        let long = "adsfklsdfkmlsklfsdlkdsfklfsdlkjfsdklsfdkl ".repeat(20);
        let value = json!({"a": long, "b": long});
        let plain_len = value.to_string().len();

        h.cache.set_json("compressionTest", value.clone(), None).unwrap().await.unwrap();
        let stored = h.durable.get_item("client-cache.compressionTest").unwrap().unwrap();
        assert!(stored.len() < plain_len);

        let back = h.cache.get("compressionTest", None).unwrap().unwrap();
        assert_eq!(back.to_json(), value);

        // Same value again is detected through decompression
        let outcome = h.cache.set_json("compressionTest", value, None).unwrap().await.unwrap();
        assert_eq!(outcome, WriteOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_compression_toggle_epochs() {
        let h = harness();

        h.cache.set("a", "plain epoch", None).unwrap().await.unwrap();
        assert_eq!(h.cache.get("a", None).unwrap(), Some(CacheValue::from("plain epoch")));

        h.cache.configure(StorageOptionsPatch::new().use_compression(true)).unwrap();
        h.cache.set("b", "compressed epoch", None).unwrap().await.unwrap();
        assert_eq!(
            h.cache.get("b", None).unwrap(),
            Some(CacheValue::from("compressed epoch"))
        );
        // Entry from the previous epoch is not decodable now
        assert_eq!(h.cache.get("a", None).unwrap(), None);
        assert_eq!(h.cache.stats().undecodable, 1);

        h.cache.configure(StorageOptionsPatch::new().use_compression(false)).unwrap();
        h.cache.set("c", "plain again", None).unwrap().await.unwrap();
        assert_eq!(h.cache.get("c", None).unwrap(), Some(CacheValue::from("plain again")));
        assert_eq!(h.cache.get("a", None).unwrap(), Some(CacheValue::from("plain epoch")));
    }

    #[tokio::test]
    async fn test_alternate_codec() {
        let h = harness_with(StorageOptions {
            use_compression: true,
            codec: CompressionCodec::new(CompressionAlgorithm::Zstd, TextEncoding::Base64UrlSafe),
            ..Default::default()
        });

        h.cache.set_json("k", json!([1, 2, 3]), None).unwrap().await.unwrap();
        assert_eq!(h.cache.get("k", None).unwrap().unwrap().to_json(), json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_try_get_set_uses_cache() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));
        let source = counting_source(calls.clone(), CacheValue::from("fresh"));

        h.cache.set_json("key", json!({"t": "as"}), None).unwrap().await.unwrap();
        let value = h.cache.try_get_set("key", &source).await.unwrap();

        assert_eq!(value.to_json(), json!({"t": "as"}));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_try_get_set_fetches_once_and_persists() {
        let h = harness();
        let calls = Arc::new(AtomicUsize::new(0));
        let response: CacheValue = json!({"t": "blah"}).try_into().unwrap();
        let source = counting_source(calls.clone(), response.clone());

        let value = h.cache.try_get_set("key", &source).await.unwrap();
        assert_eq!(value, response);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(h.durable.get_item("client-cache.key").unwrap().is_some());

        // Second call is served from cache
        h.cache.try_get_set("key", &source).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.cache.stats().fetches, 1);
    }

    #[tokio::test]
    async fn test_try_get_set_with_builder() {
        let h = harness();
        let iso = "2024-05-06T07:08:09.010Z";
        let source = || async move {
            Ok::<_, anyhow::Error>(CacheValue::try_from(json!({"t": iso}))?)
        };

        let built = h
            .cache
            .try_get_set_with("key", &source, |item| {
                let text = item.to_json()["t"].as_str().map(str::to_string).unwrap_or_default();
                chrono::DateTime::parse_from_rfc3339(&text).ok()
            })
            .await
            .unwrap();

        assert!(built.is_some());
        // Raw response is what got cached
        assert_eq!(
            h.cache.get("key", None).unwrap().unwrap().to_json(),
            json!({"t": iso})
        );
    }

    #[tokio::test]
    async fn test_try_get_set_propagates_fetch_failure() {
        let h = harness();
        let source = || async { Err::<CacheValue, _>(anyhow::anyhow!("upstream returned 500")) };

        let err = h.cache.try_get_set("key", &source).await.unwrap_err();
        assert_matches!(&err, Error::Fetch { key, reason } if key == "key" && reason.contains("500"));
        assert!(err.is_transient());
        assert_eq!(h.cache.get("key", None).unwrap(), None);
        assert_eq!(h.cache.stats().fetch_failures, 1);
    }

    #[tokio::test]
    async fn test_slow_backend_does_not_stall_runtime() {
        let (release, gate) = std::sync::mpsc::channel();
        let durable = Arc::new(GatedStorage {
            inner: MemoryStorage::named("durable"),
            gate: parking_lot::Mutex::new(gate),
        });
        let cache = ClientCache::with_options(
            durable.clone(),
            Arc::new(MemoryStorage::named("volatile")),
            StorageOptions {
                default_storage_type: StorageType::Durable,
                ..Default::default()
            },
        )
        .unwrap();

        let pending = cache.set("k", "v", None).unwrap();

        // The writer picks the job up while this task sleeps; a write running
        // on the runtime thread would time out before the release arrives.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(cache.get("k", None).unwrap(), None);
        release.send(()).unwrap();

        assert_eq!(pending.await.unwrap(), WriteOutcome::Written);
        assert_eq!(cache.get("k", None).unwrap(), Some(CacheValue::from("v")));
        assert_eq!(durable.inner.write_count(), 1);
    }

    #[tokio::test]
    async fn test_backend_unavailable_surfaces() {
        let h = harness();

        h.durable.set_available(false);
        let err = h
            .cache
            .set("k", "v", Some(StorageType::Durable))
            .unwrap()
            .await
            .unwrap_err();
        assert!(err.is_backend_unavailable());
        assert_eq!(h.cache.stats().write_failures, 1);

        assert!(h
            .cache
            .get("k", Some(StorageType::Durable))
            .unwrap_err()
            .is_backend_unavailable());

        // Volatile-only operations still work
        h.cache.set("k", "v", Some(StorageType::Volatile)).unwrap().await.unwrap();
        assert_eq!(
            h.cache.get("k", Some(StorageType::Volatile)).unwrap(),
            Some(CacheValue::from("v"))
        );
    }

    #[tokio::test]
    async fn test_events() {
        let h = harness();
        let mut events = h.cache.subscribe();

        h.cache.set("k", "v", None).unwrap().await.unwrap();
        h.cache.get("k", None).unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::written("client-cache.k", StorageType::Both, 1, false)
        );
        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::hit("client-cache.k", BackendKind::Volatile)
        );
    }

    #[test]
    fn test_requires_runtime() {
        assert_matches!(ClientCache::in_memory(), Err(Error::Configuration(_)));
    }
}
