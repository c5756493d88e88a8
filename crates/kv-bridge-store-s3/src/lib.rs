// crates/kv-bridge-store-s3/src/lib.rs
// ============================================================================
// Module: KV Bridge S3 Store Library
// Description: S3-backed storage backend.
// Purpose: Keep serialized values as objects in S3-compatible storage.
// Dependencies: aws-sdk-s3, kv-bridge-core
// ============================================================================

//! ## Overview
//! An object storage backend implementing
//! [`kv_bridge_core::StorageBackend`] on S3 and S3-compatible services.

pub mod store;

pub use store::S3Backend;
pub use store::S3BackendConfig;
pub use store::S3BackendError;
pub use store::S3ServerSideEncryption;
