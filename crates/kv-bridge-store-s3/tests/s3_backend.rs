// crates/kv-bridge-store-s3/tests/s3_backend.rs
// ============================================================================
// Module: S3 Backend Tests
// Description: Configuration validation for the S3 backend.
// Purpose: Validate construction rules without real object storage.
// ============================================================================

//! S3 backend configuration tests.

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

use kv_bridge_core::StorageBackend;
use kv_bridge_core::StorageError;
use kv_bridge_store_s3::S3Backend;
use kv_bridge_store_s3::S3BackendConfig;
use kv_bridge_store_s3::S3BackendError;
use kv_bridge_store_s3::S3ServerSideEncryption;

fn base_config() -> S3BackendConfig {
    S3BackendConfig {
        region: Some("us-east-1".to_string()),
        endpoint: Some("http://127.0.0.1:1".to_string()),
        force_path_style: true,
        max_object_bytes: Some(1024),
        ..S3BackendConfig::new("kv-bridge-test")
    }
}

#[test]
fn s3_backend_rejects_empty_bucket() {
    let mut config = base_config();
    config.bucket = "  ".to_string();
    assert!(matches!(S3Backend::new(config), Err(S3BackendError::Invalid(_))));
}

#[test]
fn s3_backend_rejects_kms_without_key() {
    let mut config = base_config();
    config.server_side_encryption = Some(S3ServerSideEncryption::AwsKms);
    assert!(matches!(S3Backend::new(config), Err(S3BackendError::Invalid(_))));
}

#[test]
fn s3_backend_rejects_invalid_prefix() {
    let mut config = base_config();
    config.prefix = Some("invalid/../prefix".to_string());
    assert!(matches!(S3Backend::new(config), Err(S3BackendError::Invalid(_))));
}

#[test]
fn s3_backend_builds_object_uris_under_the_prefix() {
    let mut config = base_config();
    config.prefix = Some("/predictions/".to_string());
    let backend = S3Backend::new(config).expect("backend");
    assert_eq!(backend.name(), "s3");
    assert_eq!(backend.prefix(), "predictions/");
    assert_eq!(
        backend.object_uri("daily/forecast.json").expect("uri"),
        "s3://kv-bridge-test/predictions/daily/forecast.json"
    );
}

#[test]
fn s3_backend_rejects_bad_keys_before_any_request() {
    let backend = S3Backend::new(base_config()).expect("backend");
    assert!(matches!(backend.store("a/../b", b"v"), Err(StorageError::Invalid(_))));
    assert!(matches!(backend.exists("/"), Err(StorageError::Invalid(_))));
}

#[test]
fn s3_backend_enforces_the_size_limit_before_upload() {
    let backend = S3Backend::new(base_config()).expect("backend");
    let err = backend.store("big.bin", &[0u8; 2048]).unwrap_err();
    assert!(matches!(err, StorageError::Backend(message) if message.contains("too large")));
}

#[test]
fn s3_backend_refuses_delete() {
    let backend = S3Backend::new(base_config()).expect("backend");
    assert!(matches!(backend.delete("k"), Err(StorageError::Unsupported { .. })));
}

#[test]
fn s3_config_serde_roundtrip() {
    let original = base_config();
    let json = serde_json::to_string(&original).expect("serialize");
    let restored: S3BackendConfig = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(original, restored);
}

#[test]
fn s3_config_rejects_unknown_fields() {
    let result: Result<S3BackendConfig, _> =
        serde_json::from_str(r#"{"bucket":"b","max_archive_bytes":1}"#);
    assert!(result.is_err());
}
