// crates/kv-bridge-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Storage Backend
// Description: Storage backend keeping values as BLOBs in one SQLite table.
// Purpose: Offer a single-file durable backend with upsert semantics.
// Dependencies: kv-bridge-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteBackend`] stores each key as one row of
//! `(key TEXT PRIMARY KEY, value BLOB NOT NULL, stored_at INTEGER NOT NULL)`.
//! Writes are unconditional upserts; the overwrite guard belongs to the
//! key-value store facade.
//! Invariants:
//! - The table name is a validated identifier; keys are always bound.
//! - A missing table is created only when `create_if_missing` is set.
//! - Keys never contain `..` segments and are stored without a leading `/`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use kv_bridge_core::Listing;
use kv_bridge_core::StorageBackend;
use kv_bridge_core::StorageError;
use kv_bridge_core::listing_from_keys;
use kv_bridge_core::validate_segment;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default table name.
pub const DEFAULT_TABLE: &str = "kv_store";
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum table name length.
const MAX_TABLE_NAME_LENGTH: usize = 63;
/// Maximum value size accepted by the backend.
pub const MAX_VALUE_BYTES: usize = 256 * 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode.
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode.
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` backend.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `table` must be a lower-case identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteBackendConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Table holding the values.
    #[serde(default = "default_table")]
    pub table: String,
    /// Create the table when it does not exist.
    #[serde(default = "default_create_if_missing")]
    pub create_if_missing: bool,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteBackendConfig {
    /// Creates a configuration with defaults for the given database file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: default_table(),
            create_if_missing: true,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Default table name.
fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

/// Tables are created by default.
const fn default_create_if_missing() -> bool {
    true
}

/// Default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` backend errors.
///
/// # Invariants
/// - Error messages never embed stored values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteBackendError {
    /// Filesystem error.
    #[error("sqlite backend io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite backend db error: {0}")]
    Db(String),
    /// Invalid configuration or key.
    #[error("sqlite backend invalid data: {0}")]
    Invalid(String),
    /// The table does not exist and creation is disabled.
    #[error("sqlite backend table does not exist: {0}")]
    MissingTable(String),
    /// Value exceeded the size limit.
    #[error("sqlite backend value too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual value size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteBackendError> for StorageError {
    fn from(error: SqliteBackendError) -> Self {
        match error {
            SqliteBackendError::Io(message) => Self::Io(message),
            SqliteBackendError::Db(message) => Self::Backend(message),
            SqliteBackendError::Invalid(message) => Self::Invalid(message),
            other @ (SqliteBackendError::MissingTable(_) | SqliteBackendError::TooLarge { .. }) => {
                Self::Invalid(other.to_string())
            }
        }
    }
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// Prepared SQL text for one table.
#[derive(Debug, Clone)]
struct Statements {
    /// Upsert statement.
    upsert: String,
    /// Value lookup.
    select: String,
    /// Existence probe.
    exists: String,
    /// Key enumeration.
    keys: String,
}

impl Statements {
    /// Builds statements for a quoted table name.
    fn for_table(quoted: &str) -> Self {
        Self {
            upsert: format!(
                "INSERT INTO {quoted} (key, value, stored_at) VALUES (?1, ?2, ?3) ON \
                 CONFLICT(key) DO UPDATE SET value = excluded.value, stored_at = \
                 excluded.stored_at"
            ),
            select: format!("SELECT value FROM {quoted} WHERE key = ?1"),
            exists: format!("SELECT 1 FROM {quoted} WHERE key = ?1 LIMIT 1"),
            keys: format!("SELECT key FROM {quoted} ORDER BY key"),
        }
    }
}

/// `SQLite`-backed storage backend.
#[derive(Clone)]
pub struct SqliteBackend {
    /// Shared connection.
    connection: Arc<Mutex<Connection>>,
    /// Table name.
    table: String,
    /// SQL text.
    statements: Statements,
}

impl SqliteBackend {
    /// Opens the database and ensures the table exists.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteBackendError`] when the path or table name is invalid,
    /// the database cannot be opened, or the table is missing and creation
    /// is disabled.
    pub fn new(config: &SqliteBackendConfig) -> Result<Self, SqliteBackendError> {
        validate_store_path(&config.path)?;
        let quoted = quote_table(&config.table)?;
        ensure_parent_dir(&config.path)?;
        let connection = open_connection(config)?;
        ensure_table(&connection, config, &quoted)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            table: config.table.clone(),
            statements: Statements::for_table(&quoted),
        })
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteBackendError> {
        self.connection
            .lock()
            .map_err(|_| SqliteBackendError::Db("sqlite backend mutex poisoned".to_string()))
    }

    /// Stores bytes under a key.
    fn upsert(&self, key: &str, bytes: &[u8]) -> Result<(), SqliteBackendError> {
        let key = normalize_key(key)?;
        if bytes.len() > MAX_VALUE_BYTES {
            return Err(SqliteBackendError::TooLarge {
                max_bytes: MAX_VALUE_BYTES,
                actual_bytes: bytes.len(),
            });
        }
        let connection = self.lock()?;
        connection
            .execute(&self.statements.upsert, params![key, bytes, now_ms()])
            .map_err(|err| SqliteBackendError::Db(err.to_string()))?;
        Ok(())
    }

    /// Loads bytes for a key.
    fn select(&self, key: &str) -> Result<Option<Vec<u8>>, SqliteBackendError> {
        let key = normalize_key(key)?;
        let connection = self.lock()?;
        connection
            .query_row(&self.statements.select, params![key], |row| row.get(0))
            .optional()
            .map_err(|err| SqliteBackendError::Db(err.to_string()))
    }

    /// Returns true when a row exists for the key.
    fn probe(&self, key: &str) -> Result<bool, SqliteBackendError> {
        let key = normalize_key(key)?;
        let connection = self.lock()?;
        connection
            .query_row(&self.statements.exists, params![key], |_| Ok(()))
            .optional()
            .map(|row| row.is_some())
            .map_err(|err| SqliteBackendError::Db(err.to_string()))
    }

    /// Returns every stored key in order.
    fn all_keys(&self) -> Result<Vec<String>, SqliteBackendError> {
        let connection = self.lock()?;
        let mut statement = connection
            .prepare(&self.statements.keys)
            .map_err(|err| SqliteBackendError::Db(err.to_string()))?;
        let rows = statement
            .query_map(params![], |row| row.get::<_, String>(0))
            .map_err(|err| SqliteBackendError::Db(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|err| SqliteBackendError::Db(err.to_string()))
    }
}

impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        Ok(self.upsert(key, bytes)?)
    }

    fn retrieve(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.select(key)?.ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.probe(key)?)
    }

    fn list(&self, path: &str) -> Result<Listing, StorageError> {
        let keys = self.all_keys()?;
        Ok(listing_from_keys(keys.iter().map(String::as_str), path))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Normalizes a key into `a/b/c` form.
fn normalize_key(key: &str) -> Result<String, SqliteBackendError> {
    let mut segments = Vec::new();
    for segment in key.split('/').map(str::trim) {
        if segment.is_empty() || segment == "." {
            continue;
        }
        validate_segment(segment).map_err(|err| SqliteBackendError::Invalid(err.to_string()))?;
        segments.push(segment);
    }
    if segments.is_empty() {
        return Err(SqliteBackendError::Invalid("key must be non-empty".to_string()));
    }
    Ok(segments.join("/"))
}

/// Validates and quotes a table name.
fn quote_table(table: &str) -> Result<String, SqliteBackendError> {
    if table.is_empty() || table.len() > MAX_TABLE_NAME_LENGTH {
        return Err(SqliteBackendError::Invalid("table name length invalid".to_string()));
    }
    let valid = table.chars().enumerate().all(|(index, ch)| {
        ch == '_' || ch.is_ascii_lowercase() || (index > 0 && ch.is_ascii_digit())
    });
    if !valid || table.starts_with("sqlite_") {
        return Err(SqliteBackendError::Invalid(format!("table name not allowed: {table}")));
    }
    Ok(format!("\"{table}\""))
}

/// Ensures the parent directory exists for the database file.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteBackendError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteBackendError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteBackendError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteBackendError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteBackendError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteBackendError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteBackendError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection and applies pragmas.
fn open_connection(config: &SqliteBackendConfig) -> Result<Connection, SqliteBackendError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteBackendError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteBackendError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteBackendError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteBackendError::Db(err.to_string()))?;
    Ok(connection)
}

/// Creates the table or confirms it exists.
fn ensure_table(
    connection: &Connection,
    config: &SqliteBackendConfig,
    quoted: &str,
) -> Result<(), SqliteBackendError> {
    if config.create_if_missing {
        return connection
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {quoted} (key TEXT PRIMARY KEY, value BLOB NOT NULL, \
                 stored_at INTEGER NOT NULL);"
            ))
            .map_err(|err| SqliteBackendError::Db(err.to_string()));
    }
    let found: Option<i64> = connection
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![config.table],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| SqliteBackendError::Db(err.to_string()))?;
    if found.is_none() {
        return Err(SqliteBackendError::MissingTable(config.table.clone()));
    }
    Ok(())
}

/// Returns the current time in milliseconds since epoch.
fn now_ms() -> i64 {
    let ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    i64::try_from(ms).unwrap_or(i64::MAX)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
