// crates/kv-bridge-core/tests/store_contract.rs
// ============================================================================
// Module: Key-Value Store Contract Tests
// Description: Overwrite guard, read/exists semantics, and error propagation.
// Purpose: Validate the facade against the in-memory backend.
// ============================================================================

//! ## Overview
//! Exercises [`KeyValueStore`] over [`MemoryBackend`]:
//! - write without overwrite fails on an existing key and keeps the old value
//! - write with overwrite replaces the value
//! - exists before/after write
//! - `NotFound` and `Deserialize` errors propagate unchanged
//! - delete is refused with the retention rationale
//! - log events are emitted for writes and refusals

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;

use kv_bridge_core::JsonSerializer;
use kv_bridge_core::KeyValueStore;
use kv_bridge_core::LogOutcome;
use kv_bridge_core::MemoryBackend;
use kv_bridge_core::SerializerError;
use kv_bridge_core::StorageBackend;
use kv_bridge_core::StorageError;
use kv_bridge_core::StorageLogEvent;
use kv_bridge_core::StorageLogSink;
use kv_bridge_core::StoreError;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn json_store() -> KeyValueStore<MemoryBackend, JsonSerializer<Value>> {
    KeyValueStore::new(MemoryBackend::new(), JsonSerializer::new())
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<StorageLogEvent>>,
}

impl StorageLogSink for RecordingSink {
    fn record(&self, event: &StorageLogEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn write_without_overwrite_refuses_existing_key() {
    let store = json_store();
    store.write("k", &json!({"v": 1}), false).expect("first write");
    let err = store.write("k", &json!({"v": 2}), false).expect_err("second write must fail");
    assert_eq!(
        err,
        StoreError::AlreadyExists {
            key: "k".to_string()
        }
    );
    assert!(err.to_string().contains('k'));
    assert_eq!(store.read("k").expect("read"), json!({"v": 1}));
}

#[test]
fn write_with_overwrite_replaces_value() {
    let store = json_store();
    store.write("k", &json!([1, 2]), true).expect("first write");
    store.write("k", &json!([3]), true).expect("second write");
    assert_eq!(store.read("k").expect("read"), json!([3]));
}

#[test]
fn exists_tracks_writes() {
    let store = json_store();
    assert!(!store.exists("never").expect("exists"));
    store.write("now", &json!(null), false).expect("write");
    assert!(store.exists("now").expect("exists"));
}

#[test]
fn read_missing_key_propagates_not_found() {
    let store = json_store();
    let err = store.read("missing").expect_err("missing key");
    assert_eq!(err, StoreError::Storage(StorageError::NotFound("missing".to_string())));
}

#[test]
fn read_malformed_bytes_propagates_deserialize_error() {
    let store = json_store();
    store.backend().store("bad", b"{not json").expect("raw store");
    let err = store.read("bad").expect_err("malformed");
    assert!(matches!(err, StoreError::Serializer(SerializerError::Deserialize(_))));
}

#[test]
fn delete_is_refused_with_retention_rationale() {
    let store = json_store();
    store.write("k", &json!(1), false).expect("write");
    let err = store.delete("k").expect_err("delete refused");
    assert!(matches!(
        err,
        StoreError::Storage(StorageError::Unsupported {
            operation: "delete",
            ..
        })
    ));
    assert!(err.to_string().contains("garbage collection"));
    assert!(store.exists("k").expect("exists"));
}

#[test]
fn list_classifies_memory_keys() {
    let store = json_store();
    store.write("data/a/x.json", &json!(1), false).expect("write");
    store.write("data/b.json", &json!(2), false).expect("write");
    let listing = store.list("data").expect("list");
    assert_eq!(listing.folders, vec!["a".to_string()]);
    assert_eq!(listing.files, vec!["b.json".to_string()]);
}

#[test]
fn store_logs_writes_and_refusals() {
    let sink = Arc::new(RecordingSink::default());
    let store = json_store().with_log_sink(sink.clone());
    store.write("k", &json!(1), false).expect("write");
    let _ = store.write("k", &json!(2), false);
    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].outcome, LogOutcome::Success);
    assert_eq!(events[0].backend, "memory");
    assert_eq!(events[1].outcome, LogOutcome::Refused);
    assert_eq!(events[1].target.as_deref(), Some("k"));
}

#[test]
fn into_parts_returns_components() {
    let store = json_store();
    store.write("k", &json!("v"), false).expect("write");
    let (backend, _serializer) = store.into_parts();
    assert_eq!(backend.len().expect("len"), 1);
}
