// crates/kv-bridge-sftp/src/session.rs
// ============================================================================
// Module: SFTP Session
// Description: SSH transport, SFTP subsystem, and session lifecycle.
// Purpose: Provide a blocking remote filesystem over a russh connection.
// Dependencies: kv-bridge-core, russh, russh-sftp, serde, tokio
// ============================================================================

//! ## Overview
//! [`SftpSession`] owns a private current-thread tokio runtime and drives the
//! async russh client from blocking calls. It authenticates with the
//! ephemeral key, opens the `sftp` subsystem, and emulates a working
//! directory on the client side.
//! Invariants:
//! - State moves `Unconnected -> Connecting -> Connected -> Closed` only; a
//!   failed connect lands in `Closed` with no transport or key retained.
//! - The server host key is accepted without verification; every accept is
//!   logged with the key fingerprint.
//! - `close` is idempotent, drops the key, and also runs on `Drop`.
//!
//! Security posture: the endpoint is trusted by configuration only. See the
//! host key event emitted on connect.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::io;
use std::io::Read;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use kv_bridge_core::LogOutcome;
use kv_bridge_core::StorageLogEvent;
use kv_bridge_core::StorageLogSink;
use russh::Disconnect;
use russh::client;
use russh::keys::HashAlg;
use russh::keys::PrivateKeyWithHashAlg;
use russh::keys::ssh_key;
use russh_sftp::client::SftpSession as RawSftpSession;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::client::fs::File;
use russh_sftp::protocol::OpenFlags;
use russh_sftp::protocol::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::runtime::Builder;
use tokio::runtime::Runtime;

use crate::key::SessionKey;
use crate::remote::EntryKind;
use crate::remote::OpenMode;
use crate::remote::RemoteAttributes;
use crate::remote::RemoteEntry;
use crate::remote::RemoteFile;
use crate::remote::RemoteFileSystem;
use crate::remote::SessionError;
use crate::remote::SessionState;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default SFTP host.
pub const DEFAULT_SFTP_HOST: &str = "hermes";
/// Default SFTP port.
pub const DEFAULT_SFTP_PORT: u16 = 22222;
/// Default SFTP account.
pub const DEFAULT_SFTP_USER: &str = "predictions";
/// Backend label used in log events.
const LOG_BACKEND: &str = "sftp";

// ============================================================================
// SECTION: Endpoint
// ============================================================================

/// Remote SFTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SftpEndpoint {
    /// Host name or address.
    #[serde(default = "default_sftp_host")]
    pub host: String,
    /// TCP port.
    #[serde(default = "default_sftp_port")]
    pub port: u16,
    /// Account authenticated with the ephemeral key.
    #[serde(default = "default_sftp_user")]
    pub user: String,
}

impl Default for SftpEndpoint {
    fn default() -> Self {
        Self {
            host: default_sftp_host(),
            port: DEFAULT_SFTP_PORT,
            user: default_sftp_user(),
        }
    }
}

impl SftpEndpoint {
    /// Returns `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Default SFTP host.
fn default_sftp_host() -> String {
    DEFAULT_SFTP_HOST.to_string()
}

/// Default SFTP port.
const fn default_sftp_port() -> u16 {
    DEFAULT_SFTP_PORT
}

/// Default SFTP account.
fn default_sftp_user() -> String {
    DEFAULT_SFTP_USER.to_string()
}

// ============================================================================
// SECTION: SSH Handler
// ============================================================================

/// Client handler that accepts any server host key and logs it.
struct TrustingHandler {
    /// Endpoint address for log events.
    address: String,
    /// Event sink.
    sink: Arc<dyn StorageLogSink>,
}

impl client::Handler for TrustingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256);
        self.sink.record(
            &StorageLogEvent::new("sftp_host_key_unverified", LOG_BACKEND, "connect")
                .with_target(self.address.clone())
                .with_detail(format!("host key accepted without verification: {fingerprint}")),
        );
        Ok(true)
    }
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Mutable session state guarded by the session mutex.
struct SessionInner {
    /// Lifecycle state.
    state: SessionState,
    /// SFTP subsystem client.
    sftp: Option<RawSftpSession>,
    /// SSH connection handle.
    handle: Option<client::Handle<TrustingHandler>>,
    /// Authentication key, held until close.
    key: Option<SessionKey>,
    /// Canonical account root captured at connect.
    home: String,
    /// Emulated working directory; `None` means the account root.
    cwd: Option<String>,
}

/// Blocking SFTP session over a private runtime.
pub struct SftpSession {
    /// Remote endpoint.
    endpoint: SftpEndpoint,
    /// Runtime driving the async client.
    runtime: Option<Runtime>,
    /// Guarded session state.
    inner: Mutex<SessionInner>,
    /// Event sink.
    sink: Arc<dyn StorageLogSink>,
}

impl SftpSession {
    /// Creates an unconnected session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] when the runtime cannot be built.
    pub fn new(
        endpoint: SftpEndpoint,
        sink: Arc<dyn StorageLogSink>,
    ) -> Result<Self, SessionError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| SessionError::Io(err.to_string()))?;
        Ok(Self {
            endpoint,
            runtime: Some(runtime),
            inner: Mutex::new(SessionInner {
                state: SessionState::Unconnected,
                sftp: None,
                handle: None,
                key: None,
                home: String::from("."),
                cwd: None,
            }),
            sink,
        })
    }

    /// Creates a session and connects it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connect`] when the connection fails.
    pub fn open(
        endpoint: SftpEndpoint,
        key: SessionKey,
        sink: Arc<dyn StorageLogSink>,
    ) -> Result<Self, SessionError> {
        let session = Self::new(endpoint, sink)?;
        session.connect(key)?;
        Ok(session)
    }

    /// Returns the endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &SftpEndpoint {
        &self.endpoint
    }

    /// Connects, authenticates, and opens the SFTP subsystem.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connect`] when the session is not
    /// `Unconnected` or any connect step fails. The session is then `Closed`.
    pub fn connect(&self, key: SessionKey) -> Result<(), SessionError> {
        let mut inner = self.lock();
        if inner.state != SessionState::Unconnected {
            return Err(SessionError::Connect(format!(
                "session cannot connect from state {}",
                inner.state.as_str()
            )));
        }
        inner.state = SessionState::Connecting;
        let handler = TrustingHandler {
            address: self.endpoint.address(),
            sink: Arc::clone(&self.sink),
        };
        let outcome = self.block_on(establish(&self.endpoint, &key, handler)).and_then(|r| r);
        match outcome {
            Ok((handle, sftp, home)) => {
                inner.handle = Some(handle);
                inner.sftp = Some(sftp);
                inner.key = Some(key);
                inner.home = home;
                inner.cwd = None;
                inner.state = SessionState::Connected;
                self.sink.record(
                    &StorageLogEvent::new("sftp_connect", LOG_BACKEND, "connect")
                        .with_target(self.endpoint.address())
                        .with_detail(format!("authenticated as {}", self.endpoint.user)),
                );
                Ok(())
            }
            Err(err) => {
                inner.state = SessionState::Closed;
                self.sink.record(
                    &StorageLogEvent::new("sftp_connect", LOG_BACKEND, "connect")
                        .with_target(self.endpoint.address())
                        .with_outcome(LogOutcome::Failure)
                        .with_detail(err.to_string()),
                );
                Err(err)
            }
        }
    }

    /// Locks session state, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs a future to completion on the session runtime.
    fn block_on<F: Future>(&self, future: F) -> Result<F::Output, SessionError> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| SessionError::Closed("runtime shut down".to_string()))?;
        Ok(runtime.block_on(future))
    }

    /// Locks a connected session and resolves `path` against its cwd.
    fn prepare(&self, path: &str) -> Result<(MutexGuard<'_, SessionInner>, String), SessionError> {
        let inner = self.lock();
        connected(&inner)?;
        let target = resolve(&inner, path);
        Ok((inner, target))
    }
}

impl RemoteFileSystem for SftpSession {
    type File<'a> = SftpFile<'a>;

    fn state(&self) -> SessionState {
        self.lock().state
    }

    fn stat(&self, path: &str) -> Result<RemoteAttributes, SessionError> {
        let (inner, target) = self.prepare(path)?;
        let sftp = connected(&inner)?;
        let attributes = self
            .block_on(sftp.metadata(target.as_str()))?
            .map_err(|err| map_sftp_error(&target, &err))?;
        Ok(RemoteAttributes {
            size: attributes.size,
            mode: attributes.permissions,
        })
    }

    fn open(&self, path: &str, mode: OpenMode) -> Result<SftpFile<'_>, SessionError> {
        let (inner, target) = self.prepare(path)?;
        let sftp = connected(&inner)?;
        let opened = match mode {
            OpenMode::Read => self.block_on(sftp.open(target.as_str()))?,
            OpenMode::Write => self.block_on(sftp.open_with_flags(
                target.as_str(),
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            ))?,
        };
        let file = opened.map_err(|err| map_sftp_error(&target, &err))?;
        Ok(SftpFile {
            session: self,
            file: Some(file),
        })
    }

    fn listdir_attr(&self, path: &str) -> Result<Vec<RemoteEntry>, SessionError> {
        let (inner, target) = self.prepare(path)?;
        let sftp = connected(&inner)?;
        let entries = self
            .block_on(sftp.read_dir(target.as_str()))?
            .map_err(|err| map_sftp_error(&target, &err))?;
        Ok(entries
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| RemoteEntry {
                filename: entry.file_name(),
                mode: entry.metadata().permissions,
            })
            .collect())
    }

    fn mkdir(&self, path: &str) -> Result<(), SessionError> {
        let (inner, target) = self.prepare(path)?;
        let sftp = connected(&inner)?;
        self.block_on(sftp.create_dir(target.as_str()))?
            .map_err(|err| map_sftp_error(&target, &err))
    }

    fn chdir(&self, path: Option<&str>) -> Result<(), SessionError> {
        let Some(path) = path else {
            let mut inner = self.lock();
            connected(&inner)?;
            inner.cwd = None;
            return Ok(());
        };
        let kind = self.stat(path)?.kind();
        let (mut inner, target) = self.prepare(path)?;
        let sftp = connected(&inner)?;
        let canonical = self
            .block_on(sftp.canonicalize(target.as_str()))?
            .map_err(|err| map_sftp_error(&target, &err))?;
        if kind != EntryKind::Directory {
            return Err(SessionError::NotADirectory(canonical));
        }
        inner.cwd = Some(canonical);
        Ok(())
    }

    fn getcwd(&self) -> Option<String> {
        self.lock().cwd.clone()
    }

    fn close(&self) {
        let mut inner = self.lock();
        if inner.state == SessionState::Closed {
            return;
        }
        let was_connected = inner.state == SessionState::Connected;
        inner.state = SessionState::Closed;
        inner.key = None;
        inner.cwd = None;
        let sftp = inner.sftp.take();
        let handle = inner.handle.take();
        drop(inner);
        let teardown = self.block_on(async move {
            let mut failures = Vec::new();
            if let Some(sftp) = sftp
                && let Err(err) = sftp.close().await
            {
                failures.push(format!("sftp close: {err}"));
            }
            if let Some(handle) = handle
                && let Err(err) = handle.disconnect(Disconnect::ByApplication, "", "en").await
            {
                failures.push(format!("disconnect: {err}"));
            }
            failures
        });
        if was_connected {
            self.sink.record(&close_event(self.endpoint.address(), teardown));
        }
    }
}

impl Drop for SftpSession {
    fn drop(&mut self) {
        RemoteFileSystem::close(self);
        drop(self.runtime.take());
    }
}

// ============================================================================
// SECTION: File Handles
// ============================================================================

/// Open remote file bound to its session.
pub struct SftpFile<'a> {
    /// Owning session.
    session: &'a SftpSession,
    /// Open handle; `None` once released.
    file: Option<File>,
}

impl SftpFile<'_> {
    /// Returns the open handle.
    fn handle(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "remote file closed"))
    }

    /// Releases the remote handle inside the runtime.
    fn release(&mut self) -> Result<(), SessionError> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        self.session
            .block_on(async move {
                let result = file.shutdown().await;
                drop(file);
                result
            })?
            .map_err(|err| SessionError::Io(err.to_string()))
    }
}

impl Read for SftpFile<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let session = self.session;
        let file = self.handle()?;
        session.block_on(file.read(buf)).map_err(io::Error::other)?
    }
}

impl Write for SftpFile<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let session = self.session;
        let file = self.handle()?;
        session.block_on(file.write(buf)).map_err(io::Error::other)?
    }

    fn flush(&mut self) -> io::Result<()> {
        let session = self.session;
        let file = self.handle()?;
        session.block_on(file.flush()).map_err(io::Error::other)?
    }
}

impl RemoteFile for SftpFile<'_> {
    fn close(mut self) -> Result<(), SessionError> {
        self.release()
    }
}

impl Drop for SftpFile<'_> {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs the connect sequence.
async fn establish(
    endpoint: &SftpEndpoint,
    key: &SessionKey,
    handler: TrustingHandler,
) -> Result<(client::Handle<TrustingHandler>, RawSftpSession, String), SessionError> {
    let config = Arc::new(client::Config::default());
    let connect_error = |step: &str, err: &dyn std::fmt::Display| {
        SessionError::Connect(format!("{step} {}: {err}", endpoint.address()))
    };
    let mut handle = client::connect(config, (endpoint.host.as_str(), endpoint.port), handler)
        .await
        .map_err(|err| connect_error("connect to", &err))?;
    let auth = handle
        .authenticate_publickey(
            endpoint.user.as_str(),
            PrivateKeyWithHashAlg::new(key.auth_key(), None),
        )
        .await
        .map_err(|err| connect_error("authenticate with", &err))?;
    if !auth.success() {
        return Err(SessionError::Connect(format!(
            "public key authentication rejected for {} on {}",
            endpoint.user,
            endpoint.address()
        )));
    }
    let channel =
        handle.channel_open_session().await.map_err(|err| connect_error("open channel on", &err))?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(|err| connect_error("request sftp subsystem on", &err))?;
    let sftp = RawSftpSession::new(channel.into_stream())
        .await
        .map_err(|err| connect_error("start sftp on", &err))?;
    let home = sftp.canonicalize(".").await.map_err(|err| connect_error("resolve root on", &err))?;
    Ok((handle, sftp, home))
}

/// Builds the close event, marking it failed when any teardown step failed.
fn close_event(
    address: String,
    teardown: Result<Vec<String>, SessionError>,
) -> StorageLogEvent {
    let event = StorageLogEvent::new("sftp_close", LOG_BACKEND, "close").with_target(address);
    let failures = match teardown {
        Ok(failures) => failures,
        Err(err) => vec![err.to_string()],
    };
    if failures.is_empty() {
        return event;
    }
    event.with_outcome(LogOutcome::Failure).with_detail(failures.join("; "))
}

/// Returns the SFTP client when connected.
fn connected(inner: &SessionInner) -> Result<&RawSftpSession, SessionError> {
    match (&inner.state, &inner.sftp) {
        (SessionState::Connected, Some(sftp)) => Ok(sftp),
        (state, _) => Err(SessionError::not_connected(*state)),
    }
}

/// Resolves a path against the emulated working directory.
fn resolve(inner: &SessionInner, path: &str) -> String {
    if path.starts_with('/') {
        return path.to_string();
    }
    let base = inner.cwd.as_deref().unwrap_or(inner.home.as_str()).trim_end_matches('/');
    match path.trim_start_matches("./") {
        "" | "." if base.is_empty() => "/".to_string(),
        "" | "." => base.to_string(),
        relative => format!("{base}/{relative}"),
    }
}

/// Maps an SFTP error for a path.
fn map_sftp_error(path: &str, err: &SftpError) -> SessionError {
    match err {
        SftpError::Status(status) if status.status_code == StatusCode::NoSuchFile => {
            SessionError::NotFound(path.to_string())
        }
        other => SessionError::Io(format!("{path}: {other}")),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test-only assertions are permitted.")]

    use kv_bridge_core::NoopLogSink;

    use super::*;

    fn inner(home: &str, cwd: Option<&str>) -> SessionInner {
        SessionInner {
            state: SessionState::Connected,
            sftp: None,
            handle: None,
            key: None,
            home: home.to_string(),
            cwd: cwd.map(str::to_string),
        }
    }

    #[test]
    fn relative_paths_resolve_against_cwd_or_home() {
        assert_eq!(resolve(&inner("/home/p", None), "a/b.csv"), "/home/p/a/b.csv");
        assert_eq!(resolve(&inner("/home/p", Some("/data/")), "./x"), "/data/x");
        assert_eq!(resolve(&inner("/", None), "."), "/");
        assert_eq!(resolve(&inner("/home/p", Some("/data")), "/abs"), "/abs");
    }

    #[test]
    fn unconnected_session_refuses_operations_and_closes_quietly() {
        let session =
            SftpSession::new(SftpEndpoint::default(), Arc::new(NoopLogSink)).expect("session");
        assert_eq!(session.state(), SessionState::Unconnected);
        assert!(matches!(session.stat("x"), Err(SessionError::Closed(_))));
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(session.chdir(None), Err(SessionError::Closed(_))));
    }

    #[test]
    fn close_event_reports_teardown_failures() {
        let clean = close_event("h:1".to_string(), Ok(Vec::new()));
        assert_eq!(clean.outcome, LogOutcome::Success);
        assert_eq!(clean.detail, None);

        let failed = close_event(
            "h:1".to_string(),
            Ok(vec!["sftp close: channel gone".to_string(), "disconnect: eof".to_string()]),
        );
        assert_eq!(failed.outcome, LogOutcome::Failure);
        assert_eq!(failed.detail.as_deref(), Some("sftp close: channel gone; disconnect: eof"));

        let no_runtime =
            close_event("h:1".to_string(), Err(SessionError::Closed("runtime shut down".into())));
        assert_eq!(no_runtime.outcome, LogOutcome::Failure);
        assert!(no_runtime.detail.is_some_and(|detail| detail.contains("runtime shut down")));
    }

    #[test]
    fn default_endpoint_matches_the_predictions_account() {
        let endpoint = SftpEndpoint::default();
        assert_eq!(endpoint.address(), "hermes:22222");
        assert_eq!(endpoint.user, "predictions");
    }
}
