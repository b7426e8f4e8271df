//! Durable backing stores for the persistent cache
//!
//! The cache keeps its whole map under a single namespaced key, so a store
//! only needs to read and write one string blob per key.

use super::errors::CacheError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;

/// A durable key/value store holding serialized cache maps
pub trait CacheStorage: Send + Sync {
    /// Read the blob stored under `key`, `Ok(None)` if nothing was ever written
    fn read(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Replace the blob stored under `key`
    fn write(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

/// sled-backed storage; survives process restarts
pub struct SledStorage {
    db: sled::Db,
}

impl SledStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let db = sled::open(path.as_ref()).map_err(|e| CacheError::Storage(e.to_string()))?;
        Ok(Self { db })
    }
}

impl CacheStorage for SledStorage {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        let raw = self
            .db
            .get(key.as_bytes())
            .map_err(|e| CacheError::Storage(e.to_string()))?;

        match raw {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| CacheError::Corrupt(e.to_string())),
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.db
            .insert(key.as_bytes(), value.as_bytes())
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        // Writes are synchronous from the cache's point of view
        self.db
            .flush()
            .map_err(|e| CacheError::Storage(e.to_string()))?;
        Ok(())
    }
}

/// Process-local storage, used when no durable path is configured and in tests
#[derive(Default)]
pub struct MemoryStorage {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.blobs.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
