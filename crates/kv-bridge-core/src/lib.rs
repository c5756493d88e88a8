// crates/kv-bridge-core/src/lib.rs
// ============================================================================
// Module: KV Bridge Core Library
// Description: Storage contracts, serializers, and the key-value store facade.
// Purpose: Let callers read and write typed values without knowing the medium.
// Dependencies: bincode, csv, serde, serde_json, tempfile, thiserror
// ============================================================================

//! ## Overview
//! KV Bridge Core defines the two capability seams of the system, the
//! [`StorageBackend`] byte store and the [`Serializer`] codec, and composes
//! them in [`KeyValueStore`].
//! Invariants:
//! - Backends store bytes unconditionally; only [`KeyValueStore::write`]
//!   enforces the overwrite guard.
//! - Deletion is refused at every layer and deferred to out-of-band retention.
//! - Path normalization is pure and idempotent.
//!
//! The crate also ships the in-memory and local-filesystem backends plus the
//! JSON-lines log sinks shared by every backend crate.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod backend;
pub mod log;
pub mod path;
pub mod serializer;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use backend::DELETE_REFUSAL_REASON;
pub use backend::Listing;
pub use backend::LocalBackend;
pub use backend::MemoryBackend;
pub use backend::StorageBackend;
pub use backend::StorageError;
pub use backend::listing_from_keys;
pub use log::FileLogSink;
pub use log::LogOutcome;
pub use log::NoopLogSink;
pub use log::StderrLogSink;
pub use log::StorageLogEvent;
pub use log::StorageLogSink;
pub use path::fix_directory;
pub use path::fix_extension;
pub use path::make_path;
pub use path::scoped_path;
pub use path::validate_segment;
pub use serializer::BincodeSerializer;
pub use serializer::Column;
pub use serializer::ColumnData;
pub use serializer::CsvSerializer;
pub use serializer::JsonSerializer;
pub use serializer::Serializer;
pub use serializer::SerializerError;
pub use serializer::Table;
pub use store::KeyValueStore;
pub use store::StoreError;
