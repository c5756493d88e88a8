// crates/kv-bridge-store-s3/src/store.rs
// ============================================================================
// Module: S3 Storage Backend
// Description: Storage backend keeping values as objects in an S3 bucket.
// Purpose: Offer object storage with integrity metadata behind the backend contract.
// Dependencies: aws-config, aws-sdk-s3, kv-bridge-core, serde, sha2, thiserror, tokio
// ============================================================================

//! ## Overview
//! [`S3Backend`] maps each key to one object under an optional prefix. Every
//! upload carries a `sha256` metadata entry that downloads are checked
//! against. Blocking callers are served by a private runtime.
//! Invariants:
//! - Object keys are `prefix + normalized key`; `..` segments never reach S3.
//! - `exists` maps a missing object to `false`; other failures propagate.
//! - Listing uses `/` as delimiter: common prefixes are folders.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ServerSideEncryption;
use kv_bridge_core::Listing;
use kv_bridge_core::StorageBackend;
use kv_bridge_core::StorageError;
use kv_bridge_core::validate_segment;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;
use tokio::runtime::Runtime;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Metadata entry holding the hex SHA-256 of the object body.
const SHA256_METADATA_KEY: &str = "sha256";
/// Content type used for uploads.
const CONTENT_TYPE: &str = "application/octet-stream";

// ============================================================================
// SECTION: Config
// ============================================================================

/// Server-side encryption options for S3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum S3ServerSideEncryption {
    /// AES256 (SSE-S3).
    Aes256,
    /// KMS-managed encryption (SSE-KMS).
    AwsKms,
}

impl S3ServerSideEncryption {
    /// Converts to the AWS SDK encryption enum.
    const fn as_sdk(self) -> ServerSideEncryption {
        match self {
            Self::Aes256 => ServerSideEncryption::Aes256,
            Self::AwsKms => ServerSideEncryption::AwsKms,
        }
    }
}

/// Configuration for the S3 backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3BackendConfig {
    /// Bucket name.
    pub bucket: String,
    /// AWS region (optional; falls back to environment configuration).
    #[serde(default)]
    pub region: Option<String>,
    /// Optional prefix inside the bucket.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Custom endpoint URL (for S3-compatible stores).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Force path-style addressing (for S3-compatible stores).
    #[serde(default)]
    pub force_path_style: bool,
    /// Server-side encryption mode.
    #[serde(default)]
    pub server_side_encryption: Option<S3ServerSideEncryption>,
    /// Optional KMS key id for SSE-KMS.
    #[serde(default)]
    pub kms_key_id: Option<String>,
    /// Optional maximum object size in bytes.
    #[serde(default)]
    pub max_object_bytes: Option<u64>,
}

impl S3BackendConfig {
    /// Creates a configuration for a bucket with every option unset.
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: None,
            prefix: None,
            endpoint: None,
            force_path_style: false,
            server_side_encryption: None,
            kms_key_id: None,
            max_object_bytes: None,
        }
    }

    /// Validates the configuration without touching the network.
    ///
    /// # Errors
    ///
    /// Returns [`S3BackendError::Invalid`] when the bucket is empty, the
    /// prefix is unsafe, or SSE-KMS lacks a key id.
    pub fn validate(&self) -> Result<(), S3BackendError> {
        if self.bucket.trim().is_empty() {
            return Err(S3BackendError::Invalid("bucket must be set".to_string()));
        }
        if matches!(self.server_side_encryption, Some(S3ServerSideEncryption::AwsKms))
            && self.kms_key_id.is_none()
        {
            return Err(S3BackendError::Invalid(
                "kms_key_id is required for aws_kms encryption".to_string(),
            ));
        }
        normalize_prefix(self.prefix.as_deref())?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// S3 backend errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum S3BackendError {
    /// Invalid configuration or key.
    #[error("s3 backend invalid data: {0}")]
    Invalid(String),
    /// Runtime or transfer failure.
    #[error("s3 backend io error: {0}")]
    Io(String),
    /// Request rejected by the object store.
    #[error("s3 backend request error: {0}")]
    Request(String),
    /// Object body does not match its recorded digest.
    #[error("s3 backend integrity error: {0}")]
    Integrity(String),
    /// Object exceeded the size limit.
    #[error("s3 backend object too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: u64,
        /// Actual object size in bytes.
        actual_bytes: u64,
    },
}

impl From<S3BackendError> for StorageError {
    fn from(error: S3BackendError) -> Self {
        match error {
            S3BackendError::Invalid(message) => Self::Invalid(message),
            S3BackendError::Io(message) => Self::Io(message),
            S3BackendError::Request(message) => Self::Backend(message),
            other @ (S3BackendError::Integrity(_) | S3BackendError::TooLarge { .. }) => {
                Self::Backend(other.to_string())
            }
        }
    }
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// S3-backed storage backend.
pub struct S3Backend {
    /// S3 client handle.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Normalized prefix for object keys.
    prefix: String,
    /// Backend configuration.
    config: S3BackendConfig,
    /// Tokio runtime for blocking S3 calls.
    runtime: Option<Arc<Runtime>>,
}

impl Drop for S3Backend {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            let _ = std::thread::spawn(move || drop(runtime));
        }
    }
}

impl S3Backend {
    /// Creates a new S3 backend.
    ///
    /// # Errors
    ///
    /// Returns [`S3BackendError`] when validation or initialization fails.
    pub fn new(config: S3BackendConfig) -> Result<Self, S3BackendError> {
        config.validate()?;
        let prefix = normalize_prefix(config.prefix.as_deref())?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| S3BackendError::Io(err.to_string()))?;
        let shared_config = runtime.block_on(async {
            let mut loader = aws_config::defaults(BehaviorVersion::latest());
            if let Some(region) = &config.region {
                loader = loader.region(Region::new(region.clone()));
            }
            if let Some(endpoint) = &config.endpoint {
                loader = loader.endpoint_url(endpoint);
            }
            loader.load().await
        });
        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.force_path_style {
            s3_builder = s3_builder.force_path_style(true);
        }
        let client = Client::from_conf(s3_builder.build());
        Ok(Self {
            client,
            bucket: config.bucket.trim().to_string(),
            prefix,
            config,
            runtime: Some(Arc::new(runtime)),
        })
    }

    /// Returns the normalized key prefix (empty or ending in `/`).
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the object URI for a key.
    ///
    /// # Errors
    ///
    /// Returns [`S3BackendError::Invalid`] when the key is invalid.
    pub fn object_uri(&self, key: &str) -> Result<String, S3BackendError> {
        Ok(format!("s3://{}/{}", self.bucket, object_key(&self.prefix, key)?))
    }

    /// Returns the runtime or an error when the backend is shutting down.
    fn runtime(&self) -> Result<&Runtime, S3BackendError> {
        self.runtime
            .as_deref()
            .ok_or_else(|| S3BackendError::Io("s3 backend closed".to_string()))
    }

    /// Enforces the configured size limit.
    fn check_size(&self, actual_bytes: u64) -> Result<(), S3BackendError> {
        match self.config.max_object_bytes {
            Some(max_bytes) if actual_bytes > max_bytes => {
                Err(S3BackendError::TooLarge { max_bytes, actual_bytes })
            }
            _ => Ok(()),
        }
    }

    /// Uploads bytes under a key.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), S3BackendError> {
        let object_key = object_key(&self.prefix, key)?;
        self.check_size(bytes.len() as u64)?;
        let mut metadata = HashMap::new();
        metadata.insert(SHA256_METADATA_KEY.to_string(), sha256_hex(bytes));
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .body(ByteStream::from(bytes.to_vec()))
            .set_metadata(Some(metadata))
            .content_type(CONTENT_TYPE);
        if let Some(mode) = self.config.server_side_encryption {
            request = request.server_side_encryption(mode.as_sdk());
        }
        if let Some(key_id) = &self.config.kms_key_id {
            request = request.ssekms_key_id(key_id);
        }
        self.runtime()?.block_on(async {
            request.send().await.map_err(|err| S3BackendError::Request(err.to_string()))?;
            Ok(())
        })
    }

    /// Downloads the bytes for a key; `None` when the object is missing.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, S3BackendError> {
        let object_key = object_key(&self.prefix, key)?;
        let request = self.client.get_object().bucket(&self.bucket).key(object_key);
        let downloaded = self.runtime()?.block_on(async {
            let output = match request.send().await {
                Ok(output) => output,
                Err(err) if err.as_service_error().is_some_and(GetObjectError::is_no_such_key) => {
                    return Ok(None);
                }
                Err(err) => return Err(S3BackendError::Request(err.to_string())),
            };
            let expected = output
                .metadata()
                .and_then(|metadata| metadata.get(SHA256_METADATA_KEY))
                .cloned();
            let body = output
                .body
                .collect()
                .await
                .map_err(|err| S3BackendError::Io(err.to_string()))?
                .into_bytes()
                .to_vec();
            Ok(Some((body, expected)))
        })?;
        let Some((body, expected)) = downloaded else {
            return Ok(None);
        };
        self.check_size(body.len() as u64)?;
        if let Some(expected) = expected
            && expected != sha256_hex(&body)
        {
            return Err(S3BackendError::Integrity(format!("object hash mismatch for {key}")));
        }
        Ok(Some(body))
    }

    /// Returns true when an object exists for the key.
    fn head(&self, key: &str) -> Result<bool, S3BackendError> {
        let object_key = object_key(&self.prefix, key)?;
        let request = self.client.head_object().bucket(&self.bucket).key(object_key);
        self.runtime()?.block_on(async {
            match request.send().await {
                Ok(_) => Ok(true),
                Err(err) if err.as_service_error().is_some_and(HeadObjectError::is_not_found) => {
                    Ok(false)
                }
                Err(err) => Err(S3BackendError::Request(err.to_string())),
            }
        })
    }

    /// Lists the immediate children of a folder.
    fn list_folder(&self, path: &str) -> Result<Listing, S3BackendError> {
        let folder = folder_prefix(&self.prefix, path)?;
        let runtime = self.runtime()?;
        let mut listing = Listing::default();
        let mut token: Option<String> = None;
        loop {
            let request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&folder)
                .delimiter("/")
                .set_continuation_token(token.take());
            let output = runtime
                .block_on(request.send())
                .map_err(|err| S3BackendError::Request(err.to_string()))?;
            for common in output.common_prefixes() {
                if let Some(name) = common.prefix().and_then(|prefix| child_name(&folder, prefix))
                {
                    listing.folders.push(name);
                }
            }
            for object in output.contents() {
                if let Some(name) = object.key().and_then(|key| child_name(&folder, key)) {
                    listing.files.push(name);
                }
            }
            match output.next_continuation_token() {
                Some(next) if output.is_truncated().unwrap_or(false) => {
                    token = Some(next.to_string());
                }
                _ => break,
            }
        }
        listing.folders.sort();
        listing.folders.dedup();
        listing.files.sort();
        Ok(listing)
    }
}

impl StorageBackend for S3Backend {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        Ok(self.put(key, bytes)?)
    }

    fn retrieve(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.get(key)?.ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.head(key)?)
    }

    fn list(&self, path: &str) -> Result<Listing, StorageError> {
        Ok(self.list_folder(path)?)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Normalizes an optional prefix into a safe S3 path prefix.
pub(crate) fn normalize_prefix(prefix: Option<&str>) -> Result<String, S3BackendError> {
    let Some(prefix) = prefix else {
        return Ok(String::new());
    };
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    for segment in trimmed.split('/') {
        if segment.is_empty() {
            return Err(S3BackendError::Invalid("prefix contains an empty segment".to_string()));
        }
        validate_segment(segment).map_err(|err| S3BackendError::Invalid(err.to_string()))?;
    }
    Ok(format!("{trimmed}/"))
}

/// Normalizes a key into `a/b/c` form, dropping `.` and empty segments.
fn normalize_key(key: &str) -> Result<String, S3BackendError> {
    let mut segments = Vec::new();
    for segment in key.split('/').map(str::trim) {
        if segment.is_empty() || segment == "." {
            continue;
        }
        validate_segment(segment).map_err(|err| S3BackendError::Invalid(err.to_string()))?;
        segments.push(segment);
    }
    Ok(segments.join("/"))
}

/// Builds the object key for a stored value.
pub(crate) fn object_key(prefix: &str, key: &str) -> Result<String, S3BackendError> {
    let normalized = normalize_key(key)?;
    if normalized.is_empty() {
        return Err(S3BackendError::Invalid("key must be non-empty".to_string()));
    }
    Ok(format!("{prefix}{normalized}"))
}

/// Builds the listing prefix for a folder (empty folder lists the prefix root).
pub(crate) fn folder_prefix(prefix: &str, path: &str) -> Result<String, S3BackendError> {
    let normalized = normalize_key(path)?;
    if normalized.is_empty() {
        return Ok(prefix.to_string());
    }
    Ok(format!("{prefix}{normalized}/"))
}

/// Extracts the immediate child name of `folder` from a listed key.
fn child_name(folder: &str, listed: &str) -> Option<String> {
    let name = listed.strip_prefix(folder)?.trim_end_matches('/');
    if name.is_empty() || name.contains('/') {
        return None;
    }
    Some(name.to_string())
}

/// Returns the lower-case hex SHA-256 of bytes.
fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

// ============================================================================
// SECTION: Tests
// ============================================================================
