// crates/kv-bridge-sftp/src/remote.rs
// ============================================================================
// Module: Remote Filesystem Contract
// Description: Session-level operations the SFTP backend relies on.
// Purpose: Separate the storage semantics from the SSH transport.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`RemoteFileSystem`] is the narrow seam between
//! [`crate::SftpBackend`] and a live session. The production implementation
//! is [`crate::SftpSession`]; tests substitute an in-memory tree.
//! Invariants:
//! - Paths are POSIX style; relative paths resolve against the emulated cwd.
//! - `chdir(None)` returns to the account root captured at connect time.
//! - `close` is idempotent and never fails.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::io::Write;

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Mask selecting the file type bits of a POSIX mode.
pub const S_IFMT: u32 = 0o170_000;
/// Directory type bits.
pub const S_IFDIR: u32 = 0o040_000;
/// Regular file type bits.
pub const S_IFREG: u32 = 0o100_000;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Lifecycle of a remote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed but never connected.
    Unconnected,
    /// Connection attempt in progress.
    Connecting,
    /// Authenticated with the SFTP subsystem ready.
    Connected,
    /// Torn down; terminal.
    Closed,
}

impl SessionState {
    /// Returns a lower-case label for messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unconnected => "unconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

/// File open intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read an existing file.
    Read,
    /// Create or truncate, then write.
    Write,
}

/// Classification derived from mode bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Directory.
    Directory,
    /// Regular file.
    File,
    /// Symlink, socket, device, or unknown.
    Other,
}

impl EntryKind {
    /// Classifies a POSIX mode. A missing mode is [`EntryKind::Other`].
    #[must_use]
    pub const fn from_mode(mode: Option<u32>) -> Self {
        match mode {
            Some(mode) if mode & S_IFMT == S_IFDIR => Self::Directory,
            Some(mode) if mode & S_IFMT == S_IFREG => Self::File,
            _ => Self::Other,
        }
    }
}

/// Attributes of a single remote path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteAttributes {
    /// Size in bytes when reported.
    pub size: Option<u64>,
    /// POSIX mode bits when reported.
    pub mode: Option<u32>,
}

impl RemoteAttributes {
    /// Returns the entry kind implied by the mode bits.
    #[must_use]
    pub const fn kind(&self) -> EntryKind {
        EntryKind::from_mode(self.mode)
    }
}

/// A directory entry with its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Entry name without any directory component.
    pub filename: String,
    /// POSIX mode bits when reported.
    pub mode: Option<u32>,
}

impl RemoteEntry {
    /// Returns the entry kind implied by the mode bits.
    #[must_use]
    pub const fn kind(&self) -> EntryKind {
        EntryKind::from_mode(self.mode)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Remote session errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Connecting or authenticating failed.
    #[error("sftp connect error: {0}")]
    Connect(String),
    /// The session is not connected.
    #[error("sftp session is {0}")]
    Closed(String),
    /// The remote path does not exist.
    #[error("remote path not found: {0}")]
    NotFound(String),
    /// The remote path exists but is not a directory.
    #[error("remote path is not a directory: {0}")]
    NotADirectory(String),
    /// Any other remote failure.
    #[error("sftp io error: {0}")]
    Io(String),
}

impl SessionError {
    /// Returns a [`SessionError::Closed`] describing the current state.
    #[must_use]
    pub fn not_connected(state: SessionState) -> Self {
        let label = match state {
            SessionState::Unconnected => "not connected",
            SessionState::Connecting => "still connecting",
            SessionState::Connected => "connected",
            SessionState::Closed => "closed",
        };
        Self::Closed(label.to_string())
    }
}

// ============================================================================
// SECTION: Contracts
// ============================================================================

/// An open remote file handle.
///
/// Dropping a handle without calling [`RemoteFile::close`] still releases the
/// remote handle; `close` additionally reports the outcome.
pub trait RemoteFile: Read + Write {
    /// Flushes and releases the remote handle.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the release fails.
    fn close(self) -> Result<(), SessionError>;
}

/// Filesystem operations over an established session.
pub trait RemoteFileSystem: Send + Sync {
    /// Open file handle type.
    type File<'a>: RemoteFile
    where
        Self: 'a;

    /// Returns the current session state.
    fn state(&self) -> SessionState;

    /// Returns attributes of a path.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for missing paths.
    fn stat(&self, path: &str) -> Result<RemoteAttributes, SessionError>;

    /// Opens a file for reading or writing.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the file cannot be opened.
    fn open(&self, path: &str, mode: OpenMode) -> Result<Self::File<'_>, SessionError>;

    /// Lists a directory with entry attributes, excluding `.` and `..`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the directory cannot be read.
    fn listdir_attr(&self, path: &str) -> Result<Vec<RemoteEntry>, SessionError>;

    /// Creates a single directory.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when creation fails, including when the
    /// directory already exists.
    fn mkdir(&self, path: &str) -> Result<(), SessionError>;

    /// Changes the working directory; `None` returns to the account root.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] or [`SessionError::NotADirectory`]
    /// when the target cannot be entered.
    fn chdir(&self, path: Option<&str>) -> Result<(), SessionError>;

    /// Returns the working directory, or `None` when at the account root.
    fn getcwd(&self) -> Option<String>;

    /// Tears the session down. Repeated calls are no-ops.
    fn close(&self);
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_bits_classify_entries() {
        assert_eq!(EntryKind::from_mode(Some(0o040_755)), EntryKind::Directory);
        assert_eq!(EntryKind::from_mode(Some(0o100_644)), EntryKind::File);
        assert_eq!(EntryKind::from_mode(Some(0o120_777)), EntryKind::Other);
        assert_eq!(EntryKind::from_mode(None), EntryKind::Other);
    }
}
