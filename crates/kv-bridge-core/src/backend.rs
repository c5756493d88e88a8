// crates/kv-bridge-core/src/backend.rs
// ============================================================================
// Module: Storage Backend Contract
// Description: Byte-oriented put/get/exists/list over a key namespace.
// Purpose: Define the storage seam implemented by every physical medium.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! [`StorageBackend`] is the byte-level contract every storage medium
//! implements. Writes are unconditional; overwrite safety lives in
//! [`crate::KeyValueStore`]. Deletion is refused by default with
//! [`DELETE_REFUSAL_REASON`]: removal is owned by an out-of-band retention
//! process that marks entries in a register and collects them later.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod local;
mod memory;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use local::LocalBackend;
pub use memory::MemoryBackend;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Message attached to every refused delete request.
pub const DELETE_REFUSAL_REASON: &str = "low level deletion is not implemented and never will \
                                         be for file safety reasons; mark the entry for deletion \
                                         in the register and garbage collection will remove it";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Storage backend errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The key is absent from the backend.
    #[error("key not found: {0}")]
    NotFound(String),
    /// The key or path is invalid for this backend.
    #[error("invalid storage key: {0}")]
    Invalid(String),
    /// I/O failure while talking to the medium.
    #[error("storage io error: {0}")]
    Io(String),
    /// Backend-specific failure (database, object store, remote session).
    #[error("storage backend error: {0}")]
    Backend(String),
    /// The operation is deliberately unsupported by this backend.
    #[error("unsupported operation {operation}: {reason}")]
    Unsupported {
        /// Operation label.
        operation: &'static str,
        /// Why the operation is refused.
        reason: String,
    },
}

impl StorageError {
    /// Builds the error returned for refused deletes.
    #[must_use]
    pub fn delete_refused() -> Self {
        Self::Unsupported {
            operation: "delete",
            reason: DELETE_REFUSAL_REASON.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Classified snapshot of a directory's immediate children.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Listing {
    /// Child directory names.
    pub folders: Vec<String>,
    /// Child file names.
    pub files: Vec<String>,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Byte store keyed by logical keys.
pub trait StorageBackend: Send + Sync {
    /// Stable backend label used in log events.
    fn name(&self) -> &'static str;

    /// Writes bytes under `key`, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the key is invalid or the write fails.
    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Reads the bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the key is absent.
    fn retrieve(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Returns whether `key` holds a value. Never fails for a missing key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] only for failures other than absence; some
    /// backends report every failure as `Ok(false)`.
    fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Lists the immediate children of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`] unless the backend overrides it.
    fn list(&self, _path: &str) -> Result<Listing, StorageError> {
        Err(StorageError::Unsupported {
            operation: "list",
            reason: format!("{} backend does not support listing", self.name()),
        })
    }

    /// Refuses deletion.
    ///
    /// # Errors
    ///
    /// Always returns [`StorageError::Unsupported`] carrying
    /// [`DELETE_REFUSAL_REASON`].
    fn delete(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::delete_refused())
    }
}

impl<B: StorageBackend + ?Sized> StorageBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        (**self).store(key, bytes)
    }

    fn retrieve(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        (**self).retrieve(key)
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        (**self).exists(key)
    }

    fn list(&self, path: &str) -> Result<Listing, StorageError> {
        (**self).list(path)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        (**self).delete(key)
    }
}

impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        (**self).store(key, bytes)
    }

    fn retrieve(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        (**self).retrieve(key)
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        (**self).exists(key)
    }

    fn list(&self, path: &str) -> Result<Listing, StorageError> {
        (**self).list(path)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        (**self).delete(key)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Derives a [`Listing`] for `path` from a flat set of `/`-separated keys.
///
/// Keys directly under `path` become files; keys nested deeper contribute
/// their first segment below `path` as a folder. Both lists are sorted and
/// deduplicated.
pub fn listing_from_keys<'a, I>(keys: I, path: &str) -> Listing
where
    I: IntoIterator<Item = &'a str>,
{
    let prefix = path.trim_matches('/');
    let mut folders = BTreeSet::new();
    let mut files = BTreeSet::new();
    for key in keys {
        let key = key.trim_start_matches('/');
        let rest = if prefix.is_empty() {
            key
        } else {
            match key.strip_prefix(prefix).and_then(|rest| rest.strip_prefix('/')) {
                Some(rest) => rest,
                None => continue,
            }
        };
        if rest.is_empty() {
            continue;
        }
        match rest.split_once('/') {
            Some((folder, _)) if !folder.is_empty() => {
                folders.insert(folder.to_string());
            }
            Some(_) => {}
            None => {
                files.insert(rest.to_string());
            }
        }
    }
    Listing {
        folders: folders.into_iter().collect(),
        files: files.into_iter().collect(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
