// crates/kv-bridge-config/src/wiring.rs
// ============================================================================
// Module: Backend Wiring
// Description: Build log sinks and storage backends from validated config.
// Purpose: Keep backend construction in one place for every entry point.
// Dependencies: kv-bridge-core, kv-bridge-sftp, kv-bridge-store-*
// ============================================================================

//! ## Overview
//! Turns a validated [`KvBridgeConfig`] into live components. Backends are
//! returned as boxed trait objects so callers pick the serializer separately.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use kv_bridge_core::FileLogSink;
use kv_bridge_core::LocalBackend;
use kv_bridge_core::MemoryBackend;
use kv_bridge_core::NoopLogSink;
use kv_bridge_core::StderrLogSink;
use kv_bridge_core::StorageBackend;
use kv_bridge_core::StorageLogSink;
use kv_bridge_sftp::PostgresCredentialStore;
use kv_bridge_sftp::SftpBackend;
use kv_bridge_store_s3::S3Backend;
use kv_bridge_store_sqlite::SqliteBackend;

use crate::config::BackendKind;
use crate::config::ConfigError;
use crate::config::KvBridgeConfig;
use crate::config::LogSinkKind;
use crate::config::missing_section;

// ============================================================================
// SECTION: Wiring
// ============================================================================

impl KvBridgeConfig {
    /// Opens the configured log sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the log file cannot be opened.
    pub fn open_log_sink(&self) -> Result<Arc<dyn StorageLogSink>, ConfigError> {
        match self.logging.sink {
            LogSinkKind::File => {
                let sink = FileLogSink::new(&self.logging.file).map_err(|err| {
                    ConfigError::Io(format!("{}: {err}", self.logging.file.display()))
                })?;
                Ok(Arc::new(sink))
            }
            LogSinkKind::Stderr => Ok(Arc::new(StderrLogSink)),
            LogSinkKind::None => Ok(Arc::new(NoopLogSink)),
        }
    }

    /// Opens the configured storage backend.
    ///
    /// The SFTP backend runs its full connection chain here; when no
    /// extension is configured it adopts the serializer format's extension.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the configuration is invalid and
    /// [`ConfigError::Backend`] when the backend cannot be opened.
    pub fn open_backend(
        &self,
        sink: Arc<dyn StorageLogSink>,
    ) -> Result<Box<dyn StorageBackend>, ConfigError> {
        self.validate()?;
        let backend = &self.backend;
        match backend.kind {
            BackendKind::Memory => Ok(Box::new(MemoryBackend::new())),
            BackendKind::Local => {
                let settings = backend.local.as_ref().ok_or_else(|| missing_section(backend.kind))?;
                let local = LocalBackend::new(settings.root.clone()).map_err(backend_error)?;
                Ok(Box::new(local))
            }
            BackendKind::Sqlite => {
                let settings =
                    backend.sqlite.as_ref().ok_or_else(|| missing_section(backend.kind))?;
                let sqlite = SqliteBackend::new(settings).map_err(backend_error)?;
                Ok(Box::new(sqlite))
            }
            BackendKind::Sftp => {
                let mut settings = backend.sftp_settings();
                if settings.extension.is_none() {
                    settings.extension = Some(self.serializer.extension().to_string());
                }
                let credentials = PostgresCredentialStore::new(settings.credential_store.clone())
                    .map_err(backend_error)?;
                let sftp =
                    SftpBackend::connect(&settings, &credentials, sink).map_err(backend_error)?;
                Ok(Box::new(sftp))
            }
            BackendKind::S3 => {
                let settings = backend.s3.clone().ok_or_else(|| missing_section(backend.kind))?;
                let s3 = S3Backend::new(settings).map_err(backend_error)?;
                Ok(Box::new(s3))
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a backend construction failure.
fn backend_error(err: impl std::fmt::Display) -> ConfigError {
    ConfigError::Backend(err.to_string())
}
