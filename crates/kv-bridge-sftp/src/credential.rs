// crates/kv-bridge-sftp/src/credential.rs
// ============================================================================
// Module: Credential Store
// Description: Fetch the ephemeral SSH private key issued to an identity.
// Purpose: Broker short-lived SFTP keys through the Postgres certificate store.
// Dependencies: postgres, serde, thiserror, tokio-postgres-rustls, zeroize
// ============================================================================

//! ## Overview
//! The credential store is a Postgres database reached with the caller's
//! identity as the database user and authenticated by the libpq client
//! certificate. A single column of a single table holds the OpenSSH private
//! key the caller may use for the SFTP session.
//! Invariants:
//! - Key text is wrapped in [`Zeroizing`] and never printed.
//! - The database connection is closed before the key is returned.
//! - Table and column names are validated identifiers, never interpolated raw.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use postgres::NoTls;
use postgres::config::SslMode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio_postgres_rustls::MakeRustlsConnect;
use zeroize::Zeroizing;

use crate::identity::Identity;

mod tls;

pub use tls::TlsFiles;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default credential database host.
pub const DEFAULT_DB_HOST: &str = "0.0.0.0";
/// Default credential database port.
pub const DEFAULT_DB_PORT: u16 = 5432;
/// Default credential database name.
pub const DEFAULT_DB_NAME: &str = "postgres";
/// Default schema-qualified credential table.
pub const DEFAULT_CREDENTIAL_TABLE: &str = "public.sftp_cert";
/// Default credential column.
pub const DEFAULT_CREDENTIAL_COLUMN: &str = "sftp_cert";
/// Maximum key text accepted from the store.
const MAX_KEY_TEXT_BYTES: usize = 16 * 1024;
/// Maximum identifier length accepted for tables and columns.
const MAX_IDENTIFIER_LENGTH: usize = 63;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Private key text fetched from the credential store.
///
/// # Invariants
/// - Contents are wiped from memory when dropped.
pub struct CredentialRecord(Zeroizing<String>);

impl CredentialRecord {
    /// Wraps key text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(Zeroizing::new(text.into()))
    }

    /// Returns the key text.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialRecord(<redacted>)")
    }
}

/// Credential store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// The store could not be reached or queried.
    #[error("credential store error: {0}")]
    Store(String),
    /// The store holds no key for the identity.
    #[error("no credential issued for identity {identity}")]
    NotFound {
        /// Identity that was looked up.
        identity: String,
    },
    /// The stored key could not be parsed.
    #[error("credential key parse error: {0}")]
    KeyParse(String),
    /// The store configuration is unusable.
    #[error("invalid credential store configuration: {0}")]
    Invalid(String),
}

/// Source of ephemeral SSH keys.
pub trait CredentialStore: Send + Sync {
    /// Fetches the key issued to an identity.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::NotFound`] when no key is issued and
    /// [`CredentialError::Store`] when the store is unreachable.
    fn fetch(&self, identity: &Identity) -> Result<CredentialRecord, CredentialError>;
}

/// TLS mode for the credential database connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SslModeSetting {
    /// Plain TCP.
    Disable,
    /// TLS when offered, without server verification.
    Prefer,
    /// TLS required, without server verification.
    #[default]
    Require,
    /// TLS required with the server chain checked against `root.crt`.
    VerifyFull,
}

impl SslModeSetting {
    /// Parses a libpq style `sslmode` value.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Invalid`] for unknown modes.
    pub fn parse(value: &str) -> Result<Self, CredentialError> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "disable" => Ok(Self::Disable),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            "verify_full" => Ok(Self::VerifyFull),
            other => Err(CredentialError::Invalid(format!("unsupported sslmode: {other}"))),
        }
    }

    /// Returns the driver level mode.
    const fn driver_mode(self) -> SslMode {
        match self {
            Self::Disable => SslMode::Disable,
            Self::Prefer => SslMode::Prefer,
            Self::Require | Self::VerifyFull => SslMode::Require,
        }
    }
}

/// Postgres credential store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresCredentialConfig {
    /// Database host.
    #[serde(default = "default_db_host")]
    pub host: String,
    /// Database port.
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// Database name.
    #[serde(default = "default_db_name")]
    pub dbname: String,
    /// TLS mode.
    #[serde(default)]
    pub sslmode: SslModeSetting,
    /// Schema-qualified table holding the key.
    #[serde(default = "default_credential_table")]
    pub table: String,
    /// Column holding the key text.
    #[serde(default = "default_credential_column")]
    pub column: String,
    /// Client certificate material.
    #[serde(default)]
    pub tls: TlsFiles,
}

impl Default for PostgresCredentialConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: DEFAULT_DB_PORT,
            dbname: default_db_name(),
            sslmode: SslModeSetting::default(),
            table: default_credential_table(),
            column: default_credential_column(),
            tls: TlsFiles::default(),
        }
    }
}

/// Default database host.
fn default_db_host() -> String {
    DEFAULT_DB_HOST.to_string()
}

/// Default database port.
const fn default_db_port() -> u16 {
    DEFAULT_DB_PORT
}

/// Default database name.
fn default_db_name() -> String {
    DEFAULT_DB_NAME.to_string()
}

/// Default credential table.
fn default_credential_table() -> String {
    DEFAULT_CREDENTIAL_TABLE.to_string()
}

/// Default credential column.
fn default_credential_column() -> String {
    DEFAULT_CREDENTIAL_COLUMN.to_string()
}

// ============================================================================
// SECTION: Postgres Store
// ============================================================================

/// Credential store backed by a Postgres table.
#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    /// Connection settings.
    config: PostgresCredentialConfig,
    /// Prepared `SELECT` statement text.
    query: String,
}

impl PostgresCredentialStore {
    /// Creates a store after validating table and column names.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Invalid`] when an identifier is unusable.
    pub fn new(config: PostgresCredentialConfig) -> Result<Self, CredentialError> {
        let query = credential_query(&config.table, &config.column)?;
        Ok(Self {
            config,
            query,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &PostgresCredentialConfig {
        &self.config
    }

    /// Builds driver settings for an identity.
    fn driver_config(&self, identity: &Identity) -> postgres::Config {
        let mut pg_config = postgres::Config::new();
        pg_config
            .host(&self.config.host)
            .port(self.config.port)
            .user(identity.as_str())
            .dbname(&self.config.dbname)
            .ssl_mode(self.config.sslmode.driver_mode());
        pg_config
    }

    /// Opens a client using the configured TLS mode.
    fn open_client(&self, identity: &Identity) -> Result<postgres::Client, CredentialError> {
        let pg_config = self.driver_config(identity);
        match self.config.sslmode {
            SslModeSetting::Disable => pg_config
                .connect(NoTls)
                .map_err(|err| CredentialError::Store(err.to_string())),
            mode => {
                let tls = tls::client_config(&self.config.tls, mode)?;
                pg_config
                    .connect(MakeRustlsConnect::new(tls))
                    .map_err(|err| CredentialError::Store(err.to_string()))
            }
        }
    }
}

impl CredentialStore for PostgresCredentialStore {
    fn fetch(&self, identity: &Identity) -> Result<CredentialRecord, CredentialError> {
        let mut client = self.open_client(identity)?;
        let row = client
            .query_opt(self.query.as_str(), &[])
            .map_err(|err| CredentialError::Store(err.to_string()));
        let closed = client.close().map_err(|err| CredentialError::Store(err.to_string()));
        let row = row?;
        closed?;
        let Some(row) = row else {
            return Err(CredentialError::NotFound {
                identity: identity.to_string(),
            });
        };
        let text: Option<String> =
            row.try_get(0).map_err(|err| CredentialError::Store(err.to_string()))?;
        let Some(text) = text else {
            return Err(CredentialError::NotFound {
                identity: identity.to_string(),
            });
        };
        let record = CredentialRecord::new(text);
        if record.expose().len() > MAX_KEY_TEXT_BYTES {
            return Err(CredentialError::KeyParse("key text exceeds size limit".to_string()));
        }
        Ok(record)
    }
}

// ============================================================================
// SECTION: Query Construction
// ============================================================================

/// Builds the key lookup statement from validated identifiers.
///
/// The first row wins when several are visible to the identity.
///
/// # Errors
///
/// Returns [`CredentialError::Invalid`] when a name is not a plain identifier.
pub fn credential_query(table: &str, column: &str) -> Result<String, CredentialError> {
    let table = match table.split_once('.') {
        Some((schema, name)) => {
            format!("{}.{}", quote_identifier(schema)?, quote_identifier(name)?)
        }
        None => quote_identifier(table)?,
    };
    Ok(format!("SELECT {} FROM {table} LIMIT 1", quote_identifier(column)?))
}

/// Quotes a validated SQL identifier.
fn quote_identifier(name: &str) -> Result<String, CredentialError> {
    if name.is_empty() || name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(CredentialError::Invalid(format!("identifier length invalid: {name}")));
    }
    let valid = name.chars().enumerate().all(|(index, ch)| {
        ch == '_' || ch.is_ascii_lowercase() || (index > 0 && ch.is_ascii_digit())
    });
    if !valid {
        return Err(CredentialError::Invalid(format!("identifier not allowed: {name}")));
    }
    Ok(format!("\"{name}\""))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
