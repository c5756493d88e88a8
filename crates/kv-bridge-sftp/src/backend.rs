// crates/kv-bridge-sftp/src/backend.rs
// ============================================================================
// Module: SFTP Storage Backend
// Description: Storage backend contract over a remote SFTP filesystem.
// Purpose: Store serialized values as files under a chrooted root folder.
// Dependencies: kv-bridge-core, serde, thiserror
// ============================================================================

//! ## Overview
//! [`SftpBackend`] maps logical keys to canonical remote paths under a root
//! folder and implements [`StorageBackend`] over any [`RemoteFileSystem`].
//! [`SftpBackend::connect`] runs the full chain: identity, credential fetch,
//! key parse, then session connect.
//! Invariants:
//! - No key resolves outside the root folder; `..` is rejected.
//! - Remote file handles are released on every exit path.
//! - `exists` never surfaces remote errors; they read as `false`.
//! - Deletion is refused and deferred to out-of-band garbage collection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::io::Write;
use std::sync::Arc;

use kv_bridge_core::Listing;
use kv_bridge_core::LogOutcome;
use kv_bridge_core::NoopLogSink;
use kv_bridge_core::StorageBackend;
use kv_bridge_core::StorageError;
use kv_bridge_core::StorageLogEvent;
use kv_bridge_core::StorageLogSink;
use kv_bridge_core::make_path;
use kv_bridge_core::scoped_path;
use kv_bridge_core::validate_segment;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::credential::CredentialError;
use crate::credential::CredentialStore;
use crate::credential::PostgresCredentialConfig;
use crate::identity::IdentityConfig;
use crate::identity::IdentityError;
use crate::identity::resolve_identity;
use crate::key::SessionKey;
use crate::remote::EntryKind;
use crate::remote::OpenMode;
use crate::remote::RemoteFile;
use crate::remote::RemoteFileSystem;
use crate::remote::SessionError;
use crate::session::SftpEndpoint;
use crate::session::SftpSession;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Backend label used in log events.
const LOG_BACKEND: &str = "sftp";
/// Default root folder, the account root.
pub const DEFAULT_ROOT_FOLDER: &str = ".";

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Settings for the full SFTP connection chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SftpBackendConfig {
    /// Identity source.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Credential database settings.
    #[serde(default)]
    pub credential_store: PostgresCredentialConfig,
    /// Remote endpoint.
    #[serde(default)]
    pub endpoint: SftpEndpoint,
    /// Folder under the account root holding every key.
    #[serde(default = "default_root_folder")]
    pub root_folder: String,
    /// File extension enforced on names; `None` defers to the serializer and
    /// an empty string disables suffix enforcement.
    #[serde(default)]
    pub extension: Option<String>,
}

impl Default for SftpBackendConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            credential_store: PostgresCredentialConfig::default(),
            endpoint: SftpEndpoint::default(),
            root_folder: default_root_folder(),
            extension: None,
        }
    }
}

/// Default root folder.
fn default_root_folder() -> String {
    DEFAULT_ROOT_FOLDER.to_string()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while building an SFTP backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SftpBackendError {
    /// Identity resolution failed.
    #[error(transparent)]
    Identity(#[from] IdentityError),
    /// Credential fetch or key parse failed.
    #[error(transparent)]
    Credential(#[from] CredentialError),
    /// Session connect failed.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Configuration is unusable.
    #[error("invalid sftp backend configuration: {0}")]
    Invalid(String),
}

impl From<SftpBackendError> for StorageError {
    fn from(err: SftpBackendError) -> Self {
        Self::Backend(err.to_string())
    }
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// Storage backend writing one remote file per key.
pub struct SftpBackend<R: RemoteFileSystem = SftpSession> {
    /// Remote filesystem session.
    remote: R,
    /// Root folder all keys resolve under.
    root: String,
    /// Enforced file extension; empty disables enforcement.
    extension: String,
    /// Event sink.
    sink: Arc<dyn StorageLogSink>,
}

impl SftpBackend<SftpSession> {
    /// Resolves the identity, fetches and parses the key, and connects.
    ///
    /// The credential record is dropped as soon as the key is parsed. The
    /// configured extension is applied when set.
    ///
    /// # Errors
    ///
    /// Returns [`SftpBackendError`] naming the failing step.
    pub fn connect(
        config: &SftpBackendConfig,
        store: &dyn CredentialStore,
        sink: Arc<dyn StorageLogSink>,
    ) -> Result<Self, SftpBackendError> {
        validate_root(&config.root_folder)?;
        let identity = resolve_identity(&config.identity).inspect_err(|err| {
            sink.record(&failure_event("sftp_identity", "connect", err));
        })?;
        sink.record(
            &StorageLogEvent::new("sftp_identity", LOG_BACKEND, "connect")
                .with_target(identity.as_str()),
        );
        let record = store.fetch(&identity).inspect_err(|err| {
            sink.record(&failure_event("sftp_credential", "connect", err));
        })?;
        let key = SessionKey::parse(&record).inspect_err(|err| {
            sink.record(&failure_event("sftp_credential", "connect", err));
        })?;
        drop(record);
        sink.record(
            &StorageLogEvent::new("sftp_credential", LOG_BACKEND, "connect")
                .with_target(identity.as_str())
                .with_detail(format!("ephemeral key {}", key.fingerprint())),
        );
        let session = SftpSession::open(config.endpoint.clone(), key, Arc::clone(&sink))?;
        let backend = Self::with_session(
            session,
            config.root_folder.as_str(),
            config.extension.as_deref().unwrap_or_default(),
        );
        Ok(backend.with_log_sink(sink))
    }
}

impl<R: RemoteFileSystem> SftpBackend<R> {
    /// Wraps an established session.
    #[must_use]
    pub fn with_session(remote: R, root: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            remote,
            root: root.into(),
            extension: extension.into(),
            sink: Arc::new(NoopLogSink),
        }
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_log_sink(mut self, sink: Arc<dyn StorageLogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replaces the enforced extension.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Returns the enforced extension.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Returns the underlying session.
    #[must_use]
    pub const fn session(&self) -> &R {
        &self.remote
    }

    /// Returns the canonical remote path for a key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Invalid`] when the key names no file or holds
    /// a parent directory segment.
    pub fn remote_path(&self, key: &str) -> Result<String, StorageError> {
        let key = key.trim();
        let (dir, name) = key.rsplit_once('/').unwrap_or(("", key));
        let name = name.trim();
        if name.is_empty() || name == "." {
            return Err(StorageError::Invalid(format!("key does not name a file: {key}")));
        }
        validate_segment(name)?;
        let dir = scoped_path(&self.root, dir)?;
        Ok(make_path(name, &dir, &self.extension))
    }

    /// Ensures a directory exists under the root, creating missing levels.
    ///
    /// Each level is entered first and only created when entering fails. The
    /// previous working directory is restored whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when a level cannot be created or entered.
    pub fn mkdir(&self, path: &str) -> Result<(), StorageError> {
        let target = scoped_path(&self.root, path)?;
        let previous = self.remote.getcwd();
        let created = self.enter_or_create(&target);
        let restored = self.remote.chdir(previous.as_deref());
        let outcome = created.and(restored).map_err(|err| session_error(&target, err));
        let event = StorageLogEvent::new("sftp_mkdir", LOG_BACKEND, "mkdir").with_target(&target);
        match &outcome {
            Ok(()) => self.sink.record(&event),
            Err(err) => self.sink.record(
                &event.with_outcome(LogOutcome::Failure).with_detail(err.to_string()),
            ),
        }
        outcome
    }

    /// Tears down the session. Repeated calls are no-ops.
    pub fn close(&self) {
        self.remote.close();
    }

    /// Walks into `target` one level at a time.
    fn enter_or_create(&self, target: &str) -> Result<(), SessionError> {
        if target.starts_with('/') {
            self.remote.chdir(Some("/"))?;
        }
        for segment in target.split('/').filter(|segment| !segment.is_empty() && *segment != ".") {
            if self.remote.chdir(Some(segment)).is_err() {
                self.remote.mkdir(segment)?;
                self.remote.chdir(Some(segment))?;
            }
        }
        Ok(())
    }
}

impl<R: RemoteFileSystem> StorageBackend for SftpBackend<R> {
    fn name(&self) -> &'static str {
        LOG_BACKEND
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.remote_path(key)?;
        let mut file =
            self.remote.open(&path, OpenMode::Write).map_err(|err| session_error(key, err))?;
        file.write_all(bytes).map_err(|err| StorageError::Io(format!("{path}: {err}")))?;
        file.flush().map_err(|err| StorageError::Io(format!("{path}: {err}")))?;
        file.close().map_err(|err| session_error(key, err))
    }

    fn retrieve(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.remote_path(key)?;
        let mut file =
            self.remote.open(&path, OpenMode::Read).map_err(|err| session_error(key, err))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|err| StorageError::Io(format!("{path}: {err}")))?;
        file.close().map_err(|err| session_error(key, err))?;
        Ok(bytes)
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.remote_path(key)?;
        match self.remote.stat(&path) {
            Ok(_) => Ok(true),
            Err(SessionError::NotFound(_)) => Ok(false),
            Err(err) => {
                self.sink.record(
                    &StorageLogEvent::new("sftp_exists", LOG_BACKEND, "exists")
                        .with_target(path)
                        .with_outcome(LogOutcome::Failure)
                        .with_detail(format!("treated as absent: {err}")),
                );
                Ok(false)
            }
        }
    }

    fn list(&self, path: &str) -> Result<Listing, StorageError> {
        let dir = scoped_path(&self.root, path)?;
        let entries = self.remote.listdir_attr(&dir).map_err(|err| session_error(path, err))?;
        let mut listing = Listing::default();
        for entry in entries {
            match entry.kind() {
                EntryKind::Directory => listing.folders.push(entry.filename),
                EntryKind::File => listing.files.push(entry.filename),
                EntryKind::Other => {}
            }
        }
        listing.folders.sort();
        listing.files.sort();
        Ok(listing)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let err = StorageError::delete_refused();
        self.sink.record(
            &StorageLogEvent::new("sftp_delete", LOG_BACKEND, "delete")
                .with_target(key)
                .with_outcome(LogOutcome::Refused)
                .with_detail(err.to_string()),
        );
        Err(err)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a session error for a key into the storage taxonomy.
fn session_error(key: &str, err: SessionError) -> StorageError {
    match err {
        SessionError::NotFound(_) => StorageError::NotFound(key.to_string()),
        SessionError::NotADirectory(path) => {
            StorageError::Invalid(format!("remote path is not a directory: {path}"))
        }
        SessionError::Io(message) => StorageError::Io(message),
        other @ (SessionError::Connect(_) | SessionError::Closed(_)) => {
            StorageError::Backend(other.to_string())
        }
    }
}

/// Rejects root folders holding parent directory or malformed segments.
fn validate_root(root: &str) -> Result<(), SftpBackendError> {
    root.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .try_for_each(validate_segment)
        .map_err(|err| SftpBackendError::Invalid(format!("root folder {root}: {err}")))
}

/// Builds a failure event for a connect chain step.
fn failure_event(
    event: &'static str,
    operation: &'static str,
    err: &impl std::fmt::Display,
) -> StorageLogEvent {
    StorageLogEvent::new(event, LOG_BACKEND, operation)
        .with_outcome(LogOutcome::Failure)
        .with_detail(err.to_string())
}
