// crates/kv-bridge-core/src/backend/memory.rs
// ============================================================================
// Module: Memory Backend
// Description: Mutex-guarded in-process byte map.
// Purpose: Provide a zero-setup backend for tests and ephemeral pipelines.
// Dependencies: std
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::Listing;
use super::StorageBackend;
use super::StorageError;
use super::listing_from_keys;

/// In-memory storage backend keyed by the trimmed logical key.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    /// Stored values.
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    /// Creates an empty memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] when the map lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.lock()?.len())
    }

    /// Returns true when no keys are stored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] when the map lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.lock()?.is_empty())
    }

    /// Locks the entry map.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>, StorageError> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Backend("memory backend mutex poisoned".to_string()))
    }
}

/// Normalizes a key for map lookups.
fn map_key(key: &str) -> String {
    key.trim().trim_start_matches('/').to_string()
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let key = map_key(key);
        if key.is_empty() {
            return Err(StorageError::Invalid("key must be non-empty".to_string()));
        }
        self.lock()?.insert(key, bytes.to_vec());
        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.lock()?
            .get(&map_key(key))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.lock()?.contains_key(&map_key(key)))
    }

    fn list(&self, path: &str) -> Result<Listing, StorageError> {
        let entries = self.lock()?;
        Ok(listing_from_keys(entries.keys().map(String::as_str), path))
    }
}
