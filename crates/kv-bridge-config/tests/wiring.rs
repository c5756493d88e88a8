// crates/kv-bridge-config/tests/wiring.rs
// ============================================================================
// Module: Backend Wiring Tests
// Description: Open sinks and backends from configuration.
// Purpose: Validate that each configured backend kind is assembled correctly.
// ============================================================================

//! Backend wiring tests for kv-bridge-config.

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

use kv_bridge_config::BackendConfig;
use kv_bridge_config::BackendKind;
use kv_bridge_config::ConfigError;
use kv_bridge_config::KvBridgeConfig;
use kv_bridge_config::LocalBackendSettings;
use kv_bridge_config::LogSinkKind;
use kv_bridge_core::NoopLogSink;
use kv_bridge_core::StorageBackend;
use kv_bridge_core::StorageLogEvent;
use kv_bridge_sftp::IdentityConfig;
use kv_bridge_sftp::SftpBackendConfig;
use kv_bridge_store_sqlite::SqliteBackendConfig;

#[test]
fn memory_backend_round_trips() {
    let config = KvBridgeConfig::new(BackendConfig::of_kind(BackendKind::Memory));
    let backend = config.open_backend(Arc::new(NoopLogSink)).expect("open");
    assert_eq!(backend.name(), "memory");
    backend.store("k", b"v").expect("store");
    assert_eq!(backend.retrieve("k").expect("retrieve"), b"v");
}

#[test]
fn local_backend_is_rooted_at_the_configured_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut backend = BackendConfig::of_kind(BackendKind::Local);
    backend.local = Some(LocalBackendSettings {
        root: dir.path().join("store"),
    });
    let opened = KvBridgeConfig::new(backend).open_backend(Arc::new(NoopLogSink)).expect("open");
    opened.store("a/b.json", b"{}").expect("store");
    assert!(dir.path().join("store").join("a").join("b.json").is_file());
}

#[test]
fn sqlite_backend_opens_the_configured_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut backend = BackendConfig::of_kind(BackendKind::Sqlite);
    backend.sqlite = Some(SqliteBackendConfig::new(dir.path().join("kv.db")));
    let opened = KvBridgeConfig::new(backend).open_backend(Arc::new(NoopLogSink)).expect("open");
    assert_eq!(opened.name(), "sqlite");
    opened.store("k", b"v").expect("store");
    assert!(opened.exists("k").expect("exists"));
}

#[test]
fn sftp_identity_failure_is_a_backend_error_naming_the_certificate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let certificate = dir.path().join("postgresql.crt");
    let mut backend = BackendConfig::of_kind(BackendKind::Sftp);
    backend.sftp = Some(SftpBackendConfig {
        identity: IdentityConfig::with_certificate(&certificate),
        ..SftpBackendConfig::default()
    });
    let err = KvBridgeConfig::new(backend)
        .open_backend(Arc::new(NoopLogSink))
        .err()
        .expect("error");
    match err {
        ConfigError::Backend(message) => {
            assert!(message.contains(&certificate.display().to_string()), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn open_backend_validates_first() {
    let backend = BackendConfig::of_kind(BackendKind::S3);
    let err =
        KvBridgeConfig::new(backend).open_backend(Arc::new(NoopLogSink)).err().expect("error");
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn file_log_sink_appends_json_lines() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = KvBridgeConfig::new(BackendConfig::of_kind(BackendKind::Memory));
    config.logging.file = dir.path().join("kv.log");
    let sink = config.open_log_sink().expect("sink");
    sink.record(&StorageLogEvent::new("store_write", "memory", "write").with_target("k"));
    sink.record(&StorageLogEvent::new("store_read", "memory", "read").with_target("k"));
    let text = std::fs::read_to_string(dir.path().join("kv.log")).expect("read log");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("\"event\":\"store_write\""));
}

#[test]
fn unopenable_log_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = KvBridgeConfig::new(BackendConfig::of_kind(BackendKind::Memory));
    config.logging.file = dir.path().to_path_buf();
    assert!(matches!(config.open_log_sink(), Err(ConfigError::Io(_))));
    config.logging.sink = LogSinkKind::None;
    assert!(config.open_log_sink().is_ok());
}
