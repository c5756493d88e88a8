// crates/kv-bridge-core/src/store.rs
// ============================================================================
// Module: Key-Value Store
// Description: Typed read/write facade over a backend and a serializer.
// Purpose: Sequence serializer and backend calls and enforce overwrite safety.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`KeyValueStore`] composes exactly one [`StorageBackend`] and one
//! [`Serializer`]. It is the only layer that guards against accidental
//! overwrites. Backend and serializer errors propagate unchanged; nothing is
//! retried.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use crate::backend::Listing;
use crate::backend::StorageBackend;
use crate::backend::StorageError;
use crate::log::LogOutcome;
use crate::log::NoopLogSink;
use crate::log::StorageLogEvent;
use crate::log::StorageLogSink;
use crate::serializer::Serializer;
use crate::serializer::SerializerError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Key-value store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A value already exists under the key and overwriting was not requested.
    #[error("key already exists and overwrite is disabled: {key}")]
    AlreadyExists {
        /// Conflicting key.
        key: String,
    },
    /// Backend failure, propagated unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Serializer failure, propagated unchanged.
    #[error(transparent)]
    Serializer(#[from] SerializerError),
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Typed key-value store over a byte backend.
pub struct KeyValueStore<B, S> {
    /// Byte storage medium.
    backend: B,
    /// Value codec.
    serializer: S,
    /// Destination for operation logs.
    sink: Arc<dyn StorageLogSink>,
}

impl<B, S> KeyValueStore<B, S>
where
    B: StorageBackend,
    S: Serializer,
{
    /// Composes a backend and a serializer.
    pub fn new(backend: B, serializer: S) -> Self {
        Self {
            backend,
            serializer,
            sink: Arc::new(NoopLogSink),
        }
    }

    /// Routes operation logs to `sink`.
    #[must_use]
    pub fn with_log_sink(mut self, sink: Arc<dyn StorageLogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Serializes `value` and stores it under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] when `key` holds a value and
    /// `overwrite` is false; otherwise propagates serializer and backend
    /// errors.
    pub fn write(&self, key: &str, value: &S::Value, overwrite: bool) -> Result<(), StoreError> {
        if !overwrite && self.backend.exists(key)? {
            self.log("store_write", "write", key, LogOutcome::Refused, Some("key already exists"));
            return Err(StoreError::AlreadyExists {
                key: key.to_string(),
            });
        }
        let bytes = self.serializer.serialize(value)?;
        match self.backend.store(key, &bytes) {
            Ok(()) => {
                self.log("store_write", "write", key, LogOutcome::Success, None);
                Ok(())
            }
            Err(err) => {
                self.log("store_write", "write", key, LogOutcome::Failure, Some(&err.to_string()));
                Err(err.into())
            }
        }
    }

    /// Retrieves and deserializes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Propagates [`StorageError::NotFound`] from the backend and
    /// [`SerializerError::Deserialize`] from the serializer unchanged.
    pub fn read(&self, key: &str) -> Result<S::Value, StoreError> {
        let bytes = self.backend.retrieve(key).inspect_err(|err| {
            self.log("store_read", "read", key, LogOutcome::Failure, Some(&err.to_string()));
        })?;
        let value = self.serializer.deserialize(&bytes)?;
        self.log("store_read", "read", key, LogOutcome::Success, None);
        Ok(value)
    }

    /// Returns whether `key` holds a value.
    ///
    /// # Errors
    ///
    /// Propagates backend errors other than absence.
    pub fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.backend.exists(key)?)
    }

    /// Lists the immediate children of `path`.
    ///
    /// # Errors
    ///
    /// Propagates backend errors, including [`StorageError::Unsupported`].
    pub fn list(&self, path: &str) -> Result<Listing, StoreError> {
        Ok(self.backend.list(path)?)
    }

    /// Forwards a delete request, which every shipped backend refuses.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unsupported`] naming the retention rationale.
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        let result = self.backend.delete(key);
        if let Err(err) = &result {
            self.log("store_delete", "delete", key, LogOutcome::Refused, Some(&err.to_string()));
        }
        Ok(result?)
    }

    /// Returns the backend.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the serializer.
    pub const fn serializer(&self) -> &S {
        &self.serializer
    }

    /// Splits the store into its backend and serializer.
    pub fn into_parts(self) -> (B, S) {
        (self.backend, self.serializer)
    }

    /// Records an operation event.
    fn log(
        &self,
        event: &'static str,
        operation: &'static str,
        key: &str,
        outcome: LogOutcome,
        detail: Option<&str>,
    ) {
        let mut entry = StorageLogEvent::new(event, self.backend.name(), operation)
            .with_target(key)
            .with_outcome(outcome);
        if let Some(detail) = detail {
            entry = entry.with_detail(detail);
        }
        self.sink.record(&entry);
    }
}
