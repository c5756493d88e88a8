// crates/kv-bridge-sftp/src/storage.rs
// ============================================================================
// Module: SFTP Stores
// Description: Ready-made key-value stores over the SFTP backend.
// Purpose: Connect the whole chain and pair it with a serializer in one call.
// Dependencies: kv-bridge-core
// ============================================================================

//! ## Overview
//! Each constructor builds a [`PostgresCredentialStore`] from the backend
//! configuration, runs [`SftpBackend::connect`], and wraps the backend in a
//! [`KeyValueStore`]. When the configuration leaves the extension unset, the
//! serializer's extension is enforced on file names.

use std::sync::Arc;

use kv_bridge_core::BincodeSerializer;
use kv_bridge_core::CsvSerializer;
use kv_bridge_core::KeyValueStore;
use kv_bridge_core::Serializer;
use kv_bridge_core::StorageLogSink;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::backend::SftpBackend;
use crate::backend::SftpBackendConfig;
use crate::backend::SftpBackendError;
use crate::credential::CredentialStore;
use crate::credential::PostgresCredentialStore;
use crate::session::SftpSession;

/// Key-value store over a live SFTP session.
pub type SftpStorage<S> = KeyValueStore<SftpBackend<SftpSession>, S>;

/// Connects an SFTP store with an arbitrary serializer.
///
/// # Errors
///
/// Returns [`SftpBackendError`] when any step of the connect chain fails.
pub fn connect_storage<S: Serializer>(
    config: &SftpBackendConfig,
    serializer: S,
    sink: Arc<dyn StorageLogSink>,
) -> Result<SftpStorage<S>, SftpBackendError> {
    let credentials = PostgresCredentialStore::new(config.credential_store.clone())?;
    connect_storage_with(config, &credentials, serializer, sink)
}

/// Connects an SFTP store using a caller-supplied credential store.
///
/// # Errors
///
/// Returns [`SftpBackendError`] when any step of the connect chain fails.
pub fn connect_storage_with<S: Serializer>(
    config: &SftpBackendConfig,
    credentials: &dyn CredentialStore,
    serializer: S,
    sink: Arc<dyn StorageLogSink>,
) -> Result<SftpStorage<S>, SftpBackendError> {
    let extension =
        config.extension.clone().unwrap_or_else(|| serializer.extension().to_string());
    let backend =
        SftpBackend::connect(config, credentials, Arc::clone(&sink))?.with_extension(extension);
    Ok(KeyValueStore::new(backend, serializer).with_log_sink(sink))
}

/// Connects an SFTP store for tabular data encoded as CSV.
///
/// # Errors
///
/// Returns [`SftpBackendError`] when any step of the connect chain fails.
pub fn connect_data_storage(
    config: &SftpBackendConfig,
    sink: Arc<dyn StorageLogSink>,
) -> Result<SftpStorage<CsvSerializer>, SftpBackendError> {
    connect_storage(config, CsvSerializer, sink)
}

/// Connects an SFTP store for arbitrary serde objects encoded with bincode.
///
/// # Errors
///
/// Returns [`SftpBackendError`] when any step of the connect chain fails.
pub fn connect_object_storage<T>(
    config: &SftpBackendConfig,
    sink: Arc<dyn StorageLogSink>,
) -> Result<SftpStorage<BincodeSerializer<T>>, SftpBackendError>
where
    T: Serialize + DeserializeOwned,
{
    connect_storage(config, BincodeSerializer::new(), sink)
}
