// crates/kv-bridge-sftp/tests/support/mod.rs
// ============================================================================
// Module: SFTP Test Support
// Description: In-memory remote filesystem and credential store fakes.
// Purpose: Exercise backend semantics without a network.
// ============================================================================

#![allow(dead_code, reason = "Helpers are shared across several test binaries.")]

use std::collections::BTreeMap;
use std::io;
use std::io::Read;
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use kv_bridge_core::StorageLogEvent;
use kv_bridge_core::StorageLogSink;
use kv_bridge_sftp::CredentialError;
use kv_bridge_sftp::CredentialRecord;
use kv_bridge_sftp::CredentialStore;
use kv_bridge_sftp::Identity;
use kv_bridge_sftp::OpenMode;
use kv_bridge_sftp::RemoteAttributes;
use kv_bridge_sftp::RemoteEntry;
use kv_bridge_sftp::RemoteFile;
use kv_bridge_sftp::RemoteFileSystem;
use kv_bridge_sftp::SessionError;
use kv_bridge_sftp::SessionState;

/// Mode bits for fake directories.
pub const DIR_MODE: u32 = 0o040_755;
/// Mode bits for fake regular files.
pub const FILE_MODE: u32 = 0o100_644;
/// Mode bits for fake symlinks.
pub const LINK_MODE: u32 = 0o120_777;

/// Node in the fake tree.
#[derive(Debug, Clone)]
pub enum Node {
    Dir,
    File(Vec<u8>),
    Link,
}

/// In-memory remote filesystem rooted at `/`.
pub struct FakeRemote {
    nodes: Mutex<BTreeMap<String, Node>>,
    cwd: Mutex<Option<String>>,
    state: Mutex<SessionState>,
    pub open_handles: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub fail_stat: bool,
    pub fail_writes: bool,
}

impl FakeRemote {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir);
        Self {
            nodes: Mutex::new(nodes),
            cwd: Mutex::new(None),
            state: Mutex::new(SessionState::Connected),
            open_handles: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            fail_stat: false,
            fail_writes: false,
        }
    }

    pub fn insert(&self, path: &str, node: Node) {
        self.nodes.lock().unwrap().insert(path.to_string(), node);
    }

    pub fn node(&self, path: &str) -> Option<Node> {
        self.nodes.lock().unwrap().get(path).cloned()
    }

    pub fn resolve(&self, path: &str) -> String {
        let base = self.cwd.lock().unwrap().clone().unwrap_or_else(|| "/".to_string());
        let joined =
            if path.starts_with('/') { path.to_string() } else { format!("{base}/{path}") };
        let segments: Vec<&str> =
            joined.split('/').filter(|segment| !segment.is_empty() && *segment != ".").collect();
        format!("/{}", segments.join("/"))
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        let state = *self.state.lock().unwrap();
        if state == SessionState::Connected {
            Ok(())
        } else {
            Err(SessionError::not_connected(state))
        }
    }

    fn parent_is_dir(&self, path: &str) -> bool {
        let parent = match path.rsplit_once('/') {
            Some(("", _)) | None => "/".to_string(),
            Some((parent, _)) => parent.to_string(),
        };
        matches!(self.node(&parent), Some(Node::Dir))
    }
}

/// File handle over the fake tree.
pub struct FakeFile<'a> {
    remote: &'a FakeRemote,
    path: String,
    mode: OpenMode,
    buffer: Vec<u8>,
    cursor: usize,
    released: bool,
}

impl FakeFile<'_> {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.remote.open_handles.fetch_sub(1, Ordering::SeqCst);
        if self.mode == OpenMode::Write {
            self.remote.insert(&self.path, Node::File(self.buffer.clone()));
        }
    }
}

impl Read for FakeFile<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.buffer[self.cursor..];
        let count = remaining.len().min(buf.len());
        buf[..count].copy_from_slice(&remaining[..count]);
        self.cursor += count;
        Ok(count)
    }
}

impl Write for FakeFile<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.remote.fail_writes {
            return Err(io::Error::other("connection lost"));
        }
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl RemoteFile for FakeFile<'_> {
    fn close(mut self) -> Result<(), SessionError> {
        self.release();
        Ok(())
    }
}

impl Drop for FakeFile<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl RemoteFileSystem for FakeRemote {
    type File<'a> = FakeFile<'a>;

    fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    fn stat(&self, path: &str) -> Result<RemoteAttributes, SessionError> {
        self.ensure_connected()?;
        if self.fail_stat {
            return Err(SessionError::Io("permission denied".to_string()));
        }
        let resolved = self.resolve(path);
        match self.node(&resolved) {
            Some(Node::Dir) => Ok(RemoteAttributes {
                size: None,
                mode: Some(DIR_MODE),
            }),
            Some(Node::File(bytes)) => Ok(RemoteAttributes {
                size: Some(bytes.len() as u64),
                mode: Some(FILE_MODE),
            }),
            Some(Node::Link) => Ok(RemoteAttributes {
                size: None,
                mode: Some(LINK_MODE),
            }),
            None => Err(SessionError::NotFound(resolved)),
        }
    }

    fn open(&self, path: &str, mode: OpenMode) -> Result<FakeFile<'_>, SessionError> {
        self.ensure_connected()?;
        let resolved = self.resolve(path);
        let buffer = match mode {
            OpenMode::Read => match self.node(&resolved) {
                Some(Node::File(bytes)) => bytes,
                _ => return Err(SessionError::NotFound(resolved)),
            },
            OpenMode::Write => {
                if !self.parent_is_dir(&resolved) {
                    return Err(SessionError::NotFound(resolved));
                }
                Vec::new()
            }
        };
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(FakeFile {
            remote: self,
            path: resolved,
            mode,
            buffer,
            cursor: 0,
            released: false,
        })
    }

    fn listdir_attr(&self, path: &str) -> Result<Vec<RemoteEntry>, SessionError> {
        self.ensure_connected()?;
        let resolved = self.resolve(path);
        if !matches!(self.node(&resolved), Some(Node::Dir)) {
            return Err(SessionError::NotFound(resolved));
        }
        let prefix = if resolved == "/" { "/".to_string() } else { format!("{resolved}/") };
        let nodes = self.nodes.lock().unwrap();
        Ok(nodes
            .iter()
            .filter_map(|(key, node)| {
                let name = key.strip_prefix(&prefix)?;
                if name.is_empty() || name.contains('/') {
                    return None;
                }
                let mode = match node {
                    Node::Dir => DIR_MODE,
                    Node::File(_) => FILE_MODE,
                    Node::Link => LINK_MODE,
                };
                Some(RemoteEntry {
                    filename: name.to_string(),
                    mode: Some(mode),
                })
            })
            .collect())
    }

    fn mkdir(&self, path: &str) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let resolved = self.resolve(path);
        if self.node(&resolved).is_some() {
            return Err(SessionError::Io(format!("{resolved}: already exists")));
        }
        if !self.parent_is_dir(&resolved) {
            return Err(SessionError::NotFound(resolved));
        }
        self.insert(&resolved, Node::Dir);
        Ok(())
    }

    fn chdir(&self, path: Option<&str>) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let Some(path) = path else {
            *self.cwd.lock().unwrap() = None;
            return Ok(());
        };
        let resolved = self.resolve(path);
        match self.node(&resolved) {
            Some(Node::Dir) => {
                *self.cwd.lock().unwrap() = Some(resolved);
                Ok(())
            }
            Some(_) => Err(SessionError::NotADirectory(resolved)),
            None => Err(SessionError::NotFound(resolved)),
        }
    }

    fn getcwd(&self) -> Option<String> {
        self.cwd.lock().unwrap().clone()
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if *state != SessionState::Closed {
            *state = SessionState::Closed;
            self.close_calls.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Credential store returning a fixed record or error.
pub struct FakeCredentials {
    pub key: Option<String>,
    pub error: Option<CredentialError>,
    pub seen: Mutex<Vec<String>>,
}

impl FakeCredentials {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            error: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: CredentialError) -> Self {
        Self {
            key: None,
            error: Some(error),
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl CredentialStore for FakeCredentials {
    fn fetch(&self, identity: &Identity) -> Result<CredentialRecord, CredentialError> {
        self.seen.lock().unwrap().push(identity.to_string());
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        self.key.as_deref().map(CredentialRecord::new).ok_or_else(|| CredentialError::NotFound {
            identity: identity.to_string(),
        })
    }
}

/// Sink capturing every event.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<StorageLogEvent>>,
}

impl RecordingSink {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|event| event.event).collect()
    }
}

impl StorageLogSink for RecordingSink {
    fn record(&self, event: &StorageLogEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
