// crates/kv-bridge-config/src/config.rs
// ============================================================================
// Module: KV Bridge Configuration
// Description: Configuration loading, environment overrides, and validation.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: kv-bridge-core, kv-bridge-sftp, kv-bridge-store-*, serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits,
//! then environment overrides are applied, then the result is validated.
//! Missing or invalid configuration fails closed.
//! Invariants:
//! - Unknown fields are rejected at every level.
//! - Exactly the backend section matching `backend.kind` may be present.
//! - Environment overrides must be UTF-8 and non-empty.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use kv_bridge_sftp::SftpBackendConfig;
use kv_bridge_sftp::SslModeSetting;
use kv_bridge_store_s3::S3BackendConfig;
use kv_bridge_store_sqlite::SqliteBackendConfig;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "kv-bridge.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "KV_BRIDGE_CONFIG";
/// Environment variable overriding the identity used as database user.
pub const DB_USER_ENV_VAR: &str = "KV_BRIDGE_DB_USER";
/// Environment variable overriding the credential database host.
pub const DB_HOST_ENV_VAR: &str = "KV_BRIDGE_DB_HOST";
/// Environment variable overriding the credential database port.
pub const DB_PORT_ENV_VAR: &str = "KV_BRIDGE_DB_PORT";
/// Environment variable overriding the credential database name.
pub const DB_NAME_ENV_VAR: &str = "KV_BRIDGE_DB_NAME";
/// Environment variable overriding the credential database TLS mode.
pub const DB_SSLMODE_ENV_VAR: &str = "KV_BRIDGE_DB_SSLMODE";
/// Environment variable overriding the log file path.
pub const LOG_FILE_ENV_VAR: &str = "KV_BRIDGE_LOG_FILE";
/// Default log file.
pub const DEFAULT_LOG_FILE: &str = "/tmp/kv-bridge.log";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of an environment override value.
const MAX_ENV_VALUE_LENGTH: usize = 1024;
/// Maximum length of a host name.
const MAX_HOST_LENGTH: usize = 253;

// ============================================================================
// SECTION: Config Types
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KvBridgeConfig {
    /// Value encoding.
    #[serde(default)]
    pub serializer: SerializerFormat,
    /// Log sink settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Storage backend selection.
    pub backend: BackendConfig,
}

/// Value encoding selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializerFormat {
    /// Human-readable JSON documents.
    #[default]
    Json,
    /// Compact binary objects.
    Bincode,
    /// Tabular data as typed CSV.
    Csv,
}

impl SerializerFormat {
    /// Returns the file extension the format's serializer uses.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Bincode => "bin",
            Self::Csv => "csv",
        }
    }
}

/// Log sink kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSinkKind {
    /// Append JSON lines to `logging.file`.
    #[default]
    File,
    /// Write JSON lines to stderr.
    Stderr,
    /// Discard events.
    None,
}

/// Log sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: LogSinkKind,
    /// Log file used by the file sink.
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            sink: LogSinkKind::default(),
            file: default_log_file(),
        }
    }
}

/// Default log file path.
fn default_log_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE)
}

/// Backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process map; contents vanish with the process.
    Memory,
    /// Files under a local directory.
    Local,
    /// Rows of a `SQLite` table.
    Sqlite,
    /// Files on the SFTP share.
    Sftp,
    /// Objects in an S3 bucket.
    S3,
}

impl BackendKind {
    /// Returns the configuration label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Local => "local",
            Self::Sqlite => "sqlite",
            Self::Sftp => "sftp",
            Self::S3 => "s3",
        }
    }
}

/// Local directory backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalBackendSettings {
    /// Root directory holding every key.
    pub root: PathBuf,
}

/// Storage backend selection with per-kind settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Selected backend.
    pub kind: BackendKind,
    /// Local directory settings.
    #[serde(default)]
    pub local: Option<LocalBackendSettings>,
    /// `SQLite` settings.
    #[serde(default)]
    pub sqlite: Option<SqliteBackendConfig>,
    /// SFTP settings; defaults apply when omitted.
    #[serde(default)]
    pub sftp: Option<SftpBackendConfig>,
    /// S3 settings.
    #[serde(default)]
    pub s3: Option<S3BackendConfig>,
}

impl BackendConfig {
    /// Creates a selection with no per-kind settings.
    #[must_use]
    pub const fn of_kind(kind: BackendKind) -> Self {
        Self {
            kind,
            local: None,
            sqlite: None,
            sftp: None,
            s3: None,
        }
    }

    /// Returns the SFTP settings, falling back to defaults when omitted.
    #[must_use]
    pub fn sftp_settings(&self) -> SftpBackendConfig {
        self.sftp.clone().unwrap_or_default()
    }

    /// Validates the selection and the matching section.
    fn validate(&self) -> Result<(), ConfigError> {
        let present = [
            (BackendKind::Local, self.local.is_some()),
            (BackendKind::Sqlite, self.sqlite.is_some()),
            (BackendKind::Sftp, self.sftp.is_some()),
            (BackendKind::S3, self.s3.is_some()),
        ];
        for (kind, is_set) in present {
            if is_set && kind != self.kind {
                return Err(ConfigError::Invalid(format!(
                    "backend.{} is set but backend.kind is {}",
                    kind.as_str(),
                    self.kind.as_str()
                )));
            }
        }
        match self.kind {
            BackendKind::Memory => Ok(()),
            BackendKind::Local => {
                let local = self.local.as_ref().ok_or_else(|| missing_section(self.kind))?;
                validate_path_value("backend.local.root", &local.root)
            }
            BackendKind::Sqlite => {
                let sqlite = self.sqlite.as_ref().ok_or_else(|| missing_section(self.kind))?;
                validate_path_value("backend.sqlite.path", &sqlite.path)
            }
            BackendKind::Sftp => validate_sftp(&self.sftp_settings()),
            BackendKind::S3 => {
                let s3 = self.s3.as_ref().ok_or_else(|| missing_section(self.kind))?;
                validate_s3(s3)
            }
        }
    }
}

impl KvBridgeConfig {
    /// Creates a configuration for a backend with default logging and JSON
    /// values.
    #[must_use]
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            serializer: SerializerFormat::default(),
            logging: LoggingConfig::default(),
            backend,
        }
    }

    /// Loads configuration from disk using the default resolution rules and
    /// applies process environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, overriding, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |name| env::var_os(name))
    }

    /// Loads configuration reading overrides through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, overriding, or validation fails.
    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let resolved = resolve_path(path, &lookup)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml(content)?;
        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses TOML text without applying overrides or validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text is not a valid config.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies `KV_BRIDGE_*` overrides read through `lookup`.
    ///
    /// Database overrides only apply to the SFTP backend; the settings
    /// section is materialized with defaults when omitted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when an override is not UTF-8, is
    /// empty, or does not parse.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        if let Some(file) = env_value(&lookup, LOG_FILE_ENV_VAR)? {
            self.logging.file = PathBuf::from(file);
        }
        if self.backend.kind != BackendKind::Sftp {
            return Ok(());
        }
        let sftp = self.backend.sftp.get_or_insert_with(SftpBackendConfig::default);
        if let Some(user) = env_value(&lookup, DB_USER_ENV_VAR)? {
            sftp.identity.principal = Some(user);
        }
        let store = &mut sftp.credential_store;
        if let Some(host) = env_value(&lookup, DB_HOST_ENV_VAR)? {
            store.host = host;
        }
        if let Some(port) = env_value(&lookup, DB_PORT_ENV_VAR)? {
            store.port = port.parse().map_err(|_| {
                ConfigError::Invalid(format!("{DB_PORT_ENV_VAR} must be a port number"))
            })?;
        }
        if let Some(name) = env_value(&lookup, DB_NAME_ENV_VAR)? {
            store.dbname = name;
        }
        if let Some(mode) = env_value(&lookup, DB_SSLMODE_ENV_VAR)? {
            store.sslmode = SslModeSetting::parse(&mode)
                .map_err(|err| ConfigError::Invalid(format!("{DB_SSLMODE_ENV_VAR}: {err}")))?;
        }
        Ok(())
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.sink == LogSinkKind::File {
            validate_path_value("logging.file", &self.logging.file)?;
        }
        self.backend.validate()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading, validation, or wiring errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration or opening a sink.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// The configured backend could not be opened.
    #[error("backend open error: {0}")]
    Backend(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the argument or environment defaults.
fn resolve_path<F>(path: Option<&Path>, lookup: &F) -> Result<PathBuf, ConfigError>
where
    F: Fn(&str) -> Option<OsString>,
{
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Some(env_path) = lookup(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path field against length constraints.
fn validate_path_value(field: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates a host name field.
fn validate_host(field: &str, host: &str) -> Result<(), ConfigError> {
    let trimmed = host.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_HOST_LENGTH || trimmed.chars().any(char::is_whitespace) {
        return Err(ConfigError::Invalid(format!("{field} is not a valid host")));
    }
    Ok(())
}

/// Validates the SFTP chain settings.
fn validate_sftp(sftp: &SftpBackendConfig) -> Result<(), ConfigError> {
    validate_host("backend.sftp.endpoint.host", &sftp.endpoint.host)?;
    if sftp.endpoint.port == 0 {
        return Err(ConfigError::Invalid(
            "backend.sftp.endpoint.port must be non-zero".to_string(),
        ));
    }
    if sftp.endpoint.user.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "backend.sftp.endpoint.user must be non-empty".to_string(),
        ));
    }
    validate_host("backend.sftp.credential_store.host", &sftp.credential_store.host)?;
    if sftp.credential_store.port == 0 {
        return Err(ConfigError::Invalid(
            "backend.sftp.credential_store.port must be non-zero".to_string(),
        ));
    }
    if sftp.credential_store.dbname.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "backend.sftp.credential_store.dbname must be non-empty".to_string(),
        ));
    }
    if sftp.root_folder.split('/').any(|segment| segment.trim() == "..") {
        return Err(ConfigError::Invalid(
            "backend.sftp.root_folder must not contain '..' segments".to_string(),
        ));
    }
    if sftp.identity.principal.is_none() {
        validate_path_value(
            "backend.sftp.identity.certificate_path",
            &sftp.identity.certificate_path,
        )?;
    }
    Ok(())
}

/// Validates the S3 settings, including the endpoint URL.
fn validate_s3(s3: &S3BackendConfig) -> Result<(), ConfigError> {
    s3.validate().map_err(|err| ConfigError::Invalid(err.to_string()))?;
    if let Some(endpoint) = &s3.endpoint {
        let url = Url::parse(endpoint)
            .map_err(|err| ConfigError::Invalid(format!("backend.s3.endpoint: {err}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(
                "backend.s3.endpoint must use http or https".to_string(),
            ));
        }
    }
    Ok(())
}

/// Error for a backend kind without its settings section.
pub(crate) fn missing_section(kind: BackendKind) -> ConfigError {
    ConfigError::Invalid(format!("backend.{} settings are required", kind.as_str()))
}

/// Reads an override, rejecting non UTF-8, empty, and oversized values.
fn env_value<F>(lookup: &F, name: &str) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<OsString>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let value = raw
        .into_string()
        .map_err(|_| ConfigError::Invalid(format!("{name} must be valid utf-8")))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{name} must be non-empty")));
    }
    if trimmed.len() > MAX_ENV_VALUE_LENGTH {
        return Err(ConfigError::Invalid(format!("{name} exceeds max length")));
    }
    Ok(Some(trimmed.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test-only assertions are permitted.")]

    use super::*;

    #[test]
    fn env_value_rejects_empty_and_trims() {
        let lookup = |name: &str| match name {
            "EMPTY" => Some(OsString::from("  ")),
            "SET" => Some(OsString::from(" value ")),
            _ => None,
        };
        assert!(env_value(&lookup, "EMPTY").is_err());
        assert_eq!(env_value(&lookup, "SET").expect("value"), Some("value".to_string()));
        assert_eq!(env_value(&lookup, "UNSET").expect("value"), None);
    }

    #[test]
    fn resolve_path_prefers_argument_then_environment() {
        let lookup = |_: &str| Some(OsString::from("/etc/kv.toml"));
        let explicit = resolve_path(Some(Path::new("given.toml")), &lookup).expect("path");
        assert_eq!(explicit, PathBuf::from("given.toml"));
        assert_eq!(resolve_path(None, &lookup).expect("path"), PathBuf::from("/etc/kv.toml"));
        let unset = |_: &str| None;
        assert_eq!(resolve_path(None, &unset).expect("path"), PathBuf::from(DEFAULT_CONFIG_NAME));
    }

    #[test]
    fn serializer_extensions_match_serializers() {
        assert_eq!(SerializerFormat::Json.extension(), "json");
        assert_eq!(SerializerFormat::Bincode.extension(), "bin");
        assert_eq!(SerializerFormat::Csv.extension(), "csv");
    }
}
