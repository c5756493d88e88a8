// crates/kv-bridge-core/tests/local_backend.rs
// ============================================================================
// Module: Local Backend Tests
// Description: Filesystem backend storage, listing, and root confinement.
// Purpose: Validate the local backend against the storage contract.
// ============================================================================

//! Filesystem backend storage, listing, and root confinement.

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

use std::fs;

use kv_bridge_core::CsvSerializer;
use kv_bridge_core::Column;
use kv_bridge_core::ColumnData;
use kv_bridge_core::FileLogSink;
use kv_bridge_core::KeyValueStore;
use kv_bridge_core::LocalBackend;
use kv_bridge_core::StorageBackend;
use kv_bridge_core::StorageError;
use kv_bridge_core::StorageLogEvent;
use kv_bridge_core::StorageLogSink;
use kv_bridge_core::StoreError;
use kv_bridge_core::Table;
use tempfile::tempdir;

#[test]
fn store_creates_parent_directories_and_round_trips() {
    let dir = tempdir().expect("tempdir");
    let backend = LocalBackend::new(dir.path()).expect("backend");
    backend.store("runs/2024/a.bin", b"payload").expect("store");
    assert!(dir.path().join("runs/2024/a.bin").is_file());
    assert_eq!(backend.retrieve("runs/2024/a.bin").expect("retrieve"), b"payload");
}

#[test]
fn store_replaces_existing_files() {
    let dir = tempdir().expect("tempdir");
    let backend = LocalBackend::new(dir.path()).expect("backend");
    backend.store("a", b"one").expect("store");
    backend.store("a", b"two").expect("store");
    assert_eq!(backend.retrieve("a").expect("retrieve"), b"two");
}

#[test]
fn missing_keys_are_not_found_and_absent() {
    let dir = tempdir().expect("tempdir");
    let backend = LocalBackend::new(dir.path()).expect("backend");
    assert!(!backend.exists("nope").expect("exists"));
    assert_eq!(backend.retrieve("nope"), Err(StorageError::NotFound("nope".to_string())));
}

#[test]
fn parent_segments_are_rejected() {
    let dir = tempdir().expect("tempdir");
    let backend = LocalBackend::new(dir.path().join("root")).expect("backend");
    assert!(matches!(backend.store("../escape", b"x"), Err(StorageError::Invalid(_))));
    assert!(matches!(backend.retrieve("a/../../escape"), Err(StorageError::Invalid(_))));
    assert!(!dir.path().join("escape").exists());
}

#[test]
fn list_classifies_folders_and_files() {
    let dir = tempdir().expect("tempdir");
    let backend = LocalBackend::new(dir.path()).expect("backend");
    backend.store("data/a/inner.csv", b"x").expect("store");
    backend.store("data/b.csv", b"y").expect("store");
    let listing = backend.list("data").expect("list");
    assert_eq!(listing.folders, vec!["a".to_string()]);
    assert_eq!(listing.files, vec!["b.csv".to_string()]);
}

#[test]
fn list_missing_directory_is_not_found() {
    let dir = tempdir().expect("tempdir");
    let backend = LocalBackend::new(dir.path()).expect("backend");
    assert!(matches!(backend.list("absent"), Err(StorageError::NotFound(_))));
}

#[test]
fn delete_is_refused_and_file_survives() {
    let dir = tempdir().expect("tempdir");
    let backend = LocalBackend::new(dir.path()).expect("backend");
    backend.store("keep", b"x").expect("store");
    assert!(matches!(backend.delete("keep"), Err(StorageError::Unsupported { .. })));
    assert!(backend.exists("keep").expect("exists"));
}

#[test]
fn table_store_round_trips_through_disk() {
    let dir = tempdir().expect("tempdir");
    let store = KeyValueStore::new(LocalBackend::new(dir.path()).expect("backend"), CsvSerializer);
    let table = Table::new(vec![
        Column::new("step", ColumnData::Int(vec![1, 2, 3])),
        Column::new("prob", ColumnData::Float(vec![0.1, 0.2, 0.7])),
    ]);
    store.write("predictions/run.csv", &table, false).expect("write");
    assert_eq!(store.read("predictions/run.csv").expect("read"), table);
    assert!(matches!(
        store.write("predictions/run.csv", &table, false),
        Err(StoreError::AlreadyExists { .. })
    ));
}

#[test]
fn file_log_sink_appends_json_lines() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("storage.log");
    let sink = FileLogSink::new(&path).expect("sink");
    sink.record(&StorageLogEvent::new("store_write", "local", "write").with_target("a"));
    sink.record(&StorageLogEvent::new("store_read", "local", "read").with_target("a"));
    let content = fs::read_to_string(&path).expect("read log");
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json line");
    assert_eq!(first["event"], "store_write");
    assert_eq!(first["outcome"], "success");
    assert_eq!(first["target"], "a");
}
