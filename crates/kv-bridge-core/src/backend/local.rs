// crates/kv-bridge-core/src/backend/local.rs
// ============================================================================
// Module: Local Filesystem Backend
// Description: Files under a root directory, one file per key.
// Purpose: Persist values on local disk with root confinement.
// Dependencies: tempfile
// ============================================================================

//! ## Overview
//! Keys map to files below the backend root. Writes go through a temporary
//! file in the target directory and are renamed into place, so readers never
//! observe a half-written value. Keys with `..` segments are rejected.

use std::fs;
use std::io::ErrorKind;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use super::Listing;
use super::StorageBackend;
use super::StorageError;
use crate::path::scoped_path;

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    /// Root directory holding all stored files.
    root: PathBuf,
}

impl LocalBackend {
    /// Opens a backend rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] when the root cannot be created or is not
    /// a directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| StorageError::Io(err.to_string()))?;
        if !root.is_dir() {
            return Err(StorageError::Io(format!("{} is not a directory", root.display())));
        }
        Ok(Self {
            root,
        })
    }

    /// Returns the backend root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a key to a path under the root.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = scoped_path(".", key)?;
        let mut path = self.root.clone();
        for segment in relative.split('/').skip(1) {
            path.push(segment);
        }
        Ok(path)
    }

    /// Resolves a key that must name a file (not the root).
    fn resolve_file(&self, key: &str) -> Result<PathBuf, StorageError> {
        let path = self.resolve(key)?;
        if path == self.root {
            return Err(StorageError::Invalid("key must name a file".to_string()));
        }
        Ok(path)
    }
}

impl StorageBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve_file(key)?;
        let parent = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).map_err(|err| StorageError::Io(err.to_string()))?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|err| StorageError::Io(err.to_string()))?;
        temp.write_all(bytes).map_err(|err| StorageError::Io(err.to_string()))?;
        temp.as_file().sync_all().map_err(|err| StorageError::Io(err.to_string()))?;
        temp.persist(&path).map_err(|err| StorageError::Io(err.error.to_string()))?;
        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve_file(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(err) => Err(StorageError::Io(err.to_string())),
        }
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.resolve_file(key)?;
        match fs::metadata(&path) {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::Io(err.to_string())),
        }
    }

    fn list(&self, path: &str) -> Result<Listing, StorageError> {
        let dir = self.resolve(path)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.to_string()));
            }
            Err(err) => return Err(StorageError::Io(err.to_string())),
        };
        let mut listing = Listing::default();
        for entry in entries {
            let entry = entry.map_err(|err| StorageError::Io(err.to_string()))?;
            let file_type = entry.file_type().map_err(|err| StorageError::Io(err.to_string()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if file_type.is_dir() {
                listing.folders.push(name);
            } else if file_type.is_file() {
                listing.files.push(name);
            }
        }
        listing.folders.sort();
        listing.files.sort();
        Ok(listing)
    }
}
