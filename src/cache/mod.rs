//! Persistent TTL cache
//!
//! A versioned key → value store with absolute expiry, backed by a durable
//! [`CacheStorage`]. The whole map lives under one namespaced storage key and
//! is rewritten synchronously on every `set`/`clear`.
//!
//! ## Invariants
//! - An entry whose version tag differs from the cache's schema version is
//!   never returned. Stale-version entries are dropped when the map is loaded,
//!   so bumping [`CACHE_SCHEMA_VERSION`] invalidates everything transparently.
//! - An entry is returned while `now <= expiry`; the first read after that
//!   evicts it and re-persists the map.
//! - Storage failures are logged and never surface to callers. The cache is an
//!   optimisation, so a broken store degrades it to in-memory behaviour.

mod errors;
mod storage;

pub use errors::CacheError;
pub use storage::{CacheStorage, MemoryStorage, SledStorage};

use crate::metrics::metrics;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Change this when the shape of cached payloads changes
pub const CACHE_SCHEMA_VERSION: &str = "v1.0";

/// Storage key the serialized map is kept under
pub const DEFAULT_STORAGE_KEY: &str = "persistent-cache";

/// Wall clock in milliseconds. Expiry instants are absolute so that they stay
/// meaningful across reloads.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// [`Clock`] backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// One stored value with its version tag and absolute expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Value,
    /// Unix epoch milliseconds
    pub expiry: i64,
    pub version: String,
}

/// Construction options for [`PersistentCache`]
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub storage_key: String,
    pub schema_version: String,
    pub default_ttl: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            schema_version: CACHE_SCHEMA_VERSION.to_string(),
            default_ttl: Duration::from_secs(60 * 60),
        }
    }
}

pub struct PersistentCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    storage: Arc<dyn CacheStorage>,
    options: CacheOptions,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PersistentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentCache")
            .field("storage_key", &self.options.storage_key)
            .field("schema_version", &self.options.schema_version)
            .field("entries", &self.entries.lock().len())
            .finish_non_exhaustive()
    }
}

impl PersistentCache {
    /// Load the cache from `storage` using the system clock
    pub fn load(storage: Arc<dyn CacheStorage>, options: CacheOptions) -> Self {
        Self::load_with_clock(storage, options, Arc::new(SystemClock))
    }

    /// A cache that only lives as long as the process
    pub fn in_memory() -> Self {
        Self::load(Arc::new(MemoryStorage::new()), CacheOptions::default())
    }

    /// Load the cache from `storage`, dropping stale-version and expired entries.
    ///
    /// A missing, unreadable or corrupt blob yields an empty cache.
    pub fn load_with_clock(
        storage: Arc<dyn CacheStorage>,
        options: CacheOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let loaded = match storage.read(&options.storage_key) {
            Ok(Some(blob)) => match serde_json::from_str::<HashMap<String, CacheEntry>>(&blob) {
                Ok(map) => map,
                Err(e) => {
                    warn!(error = %e, key = %options.storage_key, "Failed to decode persisted cache, starting empty");
                    HashMap::new()
                }
            },
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!(error = %e, category = e.category(), "Failed to load cache from storage, starting empty");
                HashMap::new()
            }
        };

        let now = clock.now_ms();
        let total = loaded.len();
        let entries: HashMap<String, CacheEntry> = loaded
            .into_iter()
            .filter(|(_, entry)| entry.version == options.schema_version && now <= entry.expiry)
            .collect();

        if entries.len() != total {
            debug!(
                dropped = total - entries.len(),
                kept = entries.len(),
                "Dropped stale or expired cache entries on load"
            );
        }

        let cache = Self {
            entries: Mutex::new(entries),
            storage,
            options,
            clock,
        };
        cache.persist(&cache.entries.lock());
        cache
    }

    pub fn default_ttl(&self) -> Duration {
        self.options.default_ttl
    }

    /// Store `value` under `key` until `now + ttl`
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        let expiry = self
            .clock
            .now_ms()
            .saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64);
        let mut entries = self.entries.lock();
        entries.insert(
            key.to_string(),
            CacheEntry {
                data: value,
                expiry,
                version: self.options.schema_version.clone(),
            },
        );
        self.persist(&entries);
    }

    /// Store `value` under `key` with the default TTL
    pub fn set_default(&self, key: &str, value: Value) {
        self.set(key, value, self.options.default_ttl);
    }

    /// Return the live value stored under `key`, evicting it if it expired
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();

        let Some(entry) = entries.get(key) else {
            metrics().cache_misses.inc();
            return None;
        };

        if entry.version != self.options.schema_version {
            metrics().cache_misses.inc();
            return None;
        }

        if now > entry.expiry {
            entries.remove(key);
            self.persist(&entries);
            metrics().cache_misses.inc();
            return None;
        }

        metrics().cache_hits.inc();
        Some(entry.data.clone())
    }

    /// Serialize and store a typed value. Serialization failures are logged.
    pub fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_value(value) {
            Ok(v) => self.set(key, v, ttl),
            Err(e) => warn!(key, error = %e, "Refusing to cache unserializable value"),
        }
    }

    /// Read and decode a typed value; a payload of the wrong shape counts as absent
    pub fn fetch<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(key, error = %e, "Cached payload has unexpected shape");
                None
            }
        }
    }

    /// Remove one key, or everything when `key` is `None`
    pub fn clear(&self, key: Option<&str>) {
        let mut entries = self.entries.lock();
        match key {
            Some(k) => {
                entries.remove(k);
            }
            None => entries.clear(),
        }
        self.persist(&entries);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, entries: &HashMap<String, CacheEntry>) {
        let result = serde_json::to_string(entries)
            .map_err(CacheError::from)
            .and_then(|blob| self.storage.write(&self.options.storage_key, &blob));

        if let Err(e) = result {
            warn!(error = %e, category = e.category(), "Failed to persist cache, continuing in memory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ManualClock;
    use serde_json::json;

    struct BrokenStorage;

    impl CacheStorage for BrokenStorage {
        fn read(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Storage("disk on fire".to_string()))
        }

        fn write(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
            Err(CacheError::Storage("disk on fire".to_string()))
        }
    }

    fn cache_with(
        storage: Arc<dyn CacheStorage>,
        version: &str,
        clock: Arc<ManualClock>,
    ) -> PersistentCache {
        PersistentCache::load_with_clock(
            storage,
            CacheOptions {
                schema_version: version.to_string(),
                ..Default::default()
            },
            clock,
        )
    }

    #[test]
    fn test_set_then_get_returns_value() {
        let clock = Arc::new(ManualClock::new(1_000));
        let cache = cache_with(Arc::new(MemoryStorage::new()), "v1.0", clock);

        cache.set("k", json!({"a": 1}), Duration::from_secs(10));
        assert_eq!(cache.get("k"), Some(json!({"a": 1})));
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let clock = Arc::new(ManualClock::new(1_000));
        let storage = Arc::new(MemoryStorage::new());
        let cache = cache_with(storage.clone(), "v1.0", clock.clone());

        cache.set("k", json!("v"), Duration::from_millis(500));
        clock.advance_ms(500);
        assert_eq!(cache.get("k"), Some(json!("v")), "still live at the expiry instant");

        clock.advance_ms(1);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty(), "expired entry is evicted on read");

        let blob = storage.read(DEFAULT_STORAGE_KEY).unwrap().unwrap();
        assert_eq!(blob, "{}", "eviction is persisted");
    }

    #[test]
    fn test_schema_bump_invalidates_everything() {
        let clock = Arc::new(ManualClock::new(0));
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());

        let old = cache_with(storage.clone(), "v1.0", clock.clone());
        old.set("a", json!(1), Duration::from_secs(60));
        old.set("b", json!(2), Duration::from_secs(60));

        let reloaded = cache_with(storage.clone(), "v1.0", clock.clone());
        assert_eq!(reloaded.get("a"), Some(json!(1)));

        let bumped = cache_with(storage, "v2.0", clock);
        assert_eq!(bumped.get("a"), None);
        assert_eq!(bumped.get("b"), None);
        assert!(bumped.is_empty());
    }

    #[test]
    fn test_expired_entries_dropped_on_load() {
        let clock = Arc::new(ManualClock::new(0));
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());

        let cache = cache_with(storage.clone(), "v1.0", clock.clone());
        cache.set("short", json!(1), Duration::from_millis(10));
        cache.set("long", json!(2), Duration::from_secs(10));

        clock.advance_ms(11);
        let reloaded = cache_with(storage, "v1.0", clock);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("long"), Some(json!(2)));
    }

    #[test]
    fn test_clear_single_and_all() {
        let cache = PersistentCache::in_memory();
        cache.set_default("a", json!(1));
        cache.set_default("b", json!(2));

        cache.clear(Some("a"));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(json!(2)));

        cache.clear(None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_broken_storage_degrades_to_memory() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache_with(Arc::new(BrokenStorage), "v1.0", clock);

        cache.set("k", json!(true), Duration::from_secs(1));
        assert_eq!(cache.get("k"), Some(json!(true)));
    }

    #[test]
    fn test_corrupt_blob_starts_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write(DEFAULT_STORAGE_KEY, "not json").unwrap();

        let cache = PersistentCache::load(storage, CacheOptions::default());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_typed_put_and_fetch() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Remembered {
            account: String,
        }

        let cache = PersistentCache::in_memory();
        cache.put(
            "app/wallet",
            &Remembered {
                account: "abc".to_string(),
            },
            Duration::from_secs(5),
        );

        let back: Option<Remembered> = cache.fetch("app/wallet");
        assert_eq!(back.map(|r| r.account), Some("abc".to_string()));

        let wrong_shape: Option<u64> = cache.fetch("app/wallet");
        assert_eq!(wrong_shape, None);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_live_until_expiry_absent_after(ttl_ms in 1u64..10_000_000, start in 0i64..1_000_000_000) {
                let clock = Arc::new(ManualClock::new(start));
                let cache = cache_with(Arc::new(MemoryStorage::new()), "v1.0", clock.clone());

                cache.set("k", json!(ttl_ms), Duration::from_millis(ttl_ms));
                prop_assert_eq!(cache.get("k"), Some(json!(ttl_ms)));

                clock.advance_ms(ttl_ms as i64);
                prop_assert!(cache.get("k").is_some());

                clock.advance_ms(1);
                prop_assert!(cache.get("k").is_none());
            }
        }
    }
}
