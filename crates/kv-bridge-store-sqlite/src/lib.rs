// crates/kv-bridge-store-sqlite/src/lib.rs
// ============================================================================
// Module: KV Bridge SQLite Store Library
// Description: SQLite-backed storage backend.
// Purpose: Keep serialized values in one table of a local database file.
// Dependencies: kv-bridge-core, rusqlite
// ============================================================================

//! ## Overview
//! A durable single-file backend implementing
//! [`kv_bridge_core::StorageBackend`] on `SQLite`.

pub mod store;

pub use store::DEFAULT_TABLE;
pub use store::MAX_VALUE_BYTES;
pub use store::SqliteBackend;
pub use store::SqliteBackendConfig;
pub use store::SqliteBackendError;
pub use store::SqliteJournalMode;
pub use store::SqliteSyncMode;
