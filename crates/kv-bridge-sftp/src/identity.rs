// crates/kv-bridge-sftp/src/identity.rs
// ============================================================================
// Module: Identity Resolution
// Description: Derive the caller principal from configuration or a certificate.
// Purpose: Produce the identity used to authenticate to the credential store.
// Dependencies: dirs, serde, thiserror, x509-parser
// ============================================================================

//! ## Overview
//! An explicit principal always wins. Otherwise the identity is the single
//! `CN` attribute of the Subject of a PEM X.509 certificate, by default the
//! libpq client certificate at `~/.postgresql/postgresql.crt`.
//! Invariants:
//! - Exactly one `CN` must be present; zero or several is fatal.
//! - Identity errors name the certificate path so they are actionable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use x509_parser::pem::parse_x509_pem;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Certificate location relative to the home directory.
pub const DEFAULT_CERTIFICATE_RELATIVE_PATH: &str = ".postgresql/postgresql.crt";
/// Maximum certificate file size accepted.
const MAX_CERTIFICATE_BYTES: usize = 64 * 1024;
/// Maximum principal length accepted.
const MAX_PRINCIPAL_LENGTH: usize = 256;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Principal name used to authenticate to the credential store.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Creates a validated identity. The value is kept verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidPrincipal`] when the value is blank,
    /// too long, or contains control characters.
    pub fn new(value: impl Into<String>) -> Result<Self, IdentityError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(IdentityError::InvalidPrincipal("principal must be non-empty".to_string()));
        }
        if value.len() > MAX_PRINCIPAL_LENGTH {
            return Err(IdentityError::InvalidPrincipal(
                "principal exceeds length limit".to_string(),
            ));
        }
        if value.chars().any(char::is_control) {
            return Err(IdentityError::InvalidPrincipal(
                "principal contains control characters".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Returns the principal as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Identity").field(&self.0).finish()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the identity comes from.
///
/// # Invariants
/// - `principal`, when set, bypasses the certificate entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    /// Explicit principal name.
    #[serde(default)]
    pub principal: Option<String>,
    /// PEM certificate whose Subject CN names the principal.
    #[serde(default = "default_certificate_path")]
    pub certificate_path: PathBuf,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            principal: None,
            certificate_path: default_certificate_path(),
        }
    }
}

impl IdentityConfig {
    /// Creates a configuration with an explicit principal.
    #[must_use]
    pub fn with_principal(principal: impl Into<String>) -> Self {
        Self {
            principal: Some(principal.into()),
            ..Self::default()
        }
    }

    /// Creates a configuration reading the given certificate.
    #[must_use]
    pub fn with_certificate(path: impl Into<PathBuf>) -> Self {
        Self {
            principal: None,
            certificate_path: path.into(),
        }
    }
}

/// Returns the libpq client certificate path under the home directory.
#[must_use]
pub fn default_certificate_path() -> PathBuf {
    dirs::home_dir().map_or_else(
        || PathBuf::from(DEFAULT_CERTIFICATE_RELATIVE_PATH),
        |home| home.join(DEFAULT_CERTIFICATE_RELATIVE_PATH),
    )
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identity resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// No principal configured and no certificate at the expected path.
    #[error(
        "no principal configured and no certificate found at {path}; install the signed client \
         certificate or set an explicit principal"
    )]
    CertificateMissing {
        /// Certificate path that was checked.
        path: String,
    },
    /// The certificate file could not be read.
    #[error("certificate {path} could not be read: {reason}")]
    CertificateRead {
        /// Certificate path.
        path: String,
        /// Underlying failure.
        reason: String,
    },
    /// The certificate is not a valid PEM X.509 certificate.
    #[error("certificate {path} is not a valid PEM X.509 certificate: {reason}")]
    CertificateParse {
        /// Certificate path.
        path: String,
        /// Underlying failure.
        reason: String,
    },
    /// The certificate Subject has no CN attribute.
    #[error("certificate {path} subject has no CN attribute")]
    MissingCommonName {
        /// Certificate path.
        path: String,
    },
    /// The certificate Subject has more than one CN attribute.
    #[error("certificate {path} subject has {count} CN attributes; exactly one is required")]
    MultipleCommonNames {
        /// Certificate path.
        path: String,
        /// Number of CN attributes found.
        count: usize,
    },
    /// The principal value is unusable.
    #[error("invalid principal: {0}")]
    InvalidPrincipal(String),
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves the identity from configuration.
///
/// # Errors
///
/// Returns [`IdentityError`] when no explicit principal is configured and the
/// certificate is missing, unreadable, malformed, or lacks exactly one CN.
pub fn resolve_identity(config: &IdentityConfig) -> Result<Identity, IdentityError> {
    if let Some(principal) = &config.principal {
        return Identity::new(principal.as_str());
    }
    let path = config.certificate_path.as_path();
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(IdentityError::CertificateMissing {
                path: path.display().to_string(),
            });
        }
        Err(err) => {
            return Err(IdentityError::CertificateRead {
                path: path.display().to_string(),
                reason: err.to_string(),
            });
        }
    };
    if bytes.len() > MAX_CERTIFICATE_BYTES {
        return Err(IdentityError::CertificateRead {
            path: path.display().to_string(),
            reason: "certificate exceeds size limit".to_string(),
        });
    }
    identity_from_pem(&bytes, path)
}

/// Extracts the identity from PEM certificate bytes.
///
/// `source` is only used in error messages.
///
/// # Errors
///
/// Returns [`IdentityError`] when the PEM is malformed or the Subject does
/// not hold exactly one CN.
pub fn identity_from_pem(pem: &[u8], source: &Path) -> Result<Identity, IdentityError> {
    let parse_error = |reason: String| IdentityError::CertificateParse {
        path: source.display().to_string(),
        reason,
    };
    let (_, pem) = parse_x509_pem(pem).map_err(|err| parse_error(err.to_string()))?;
    if pem.label != "CERTIFICATE" {
        return Err(parse_error(format!("unexpected PEM label {}", pem.label)));
    }
    let certificate = pem.parse_x509().map_err(|err| parse_error(err.to_string()))?;
    let mut names = Vec::new();
    for attribute in certificate.subject().iter_common_name() {
        let name = attribute.as_str().map_err(|err| parse_error(err.to_string()))?;
        names.push(name.to_string());
    }
    select_common_name(names, source)
}

/// Requires exactly one CN value.
fn select_common_name(mut names: Vec<String>, source: &Path) -> Result<Identity, IdentityError> {
    match names.len() {
        0 => Err(IdentityError::MissingCommonName {
            path: source.display().to_string(),
        }),
        1 => Identity::new(names.remove(0)),
        count => Err(IdentityError::MultipleCommonNames {
            path: source.display().to_string(),
            count,
        }),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "Test-only assertions are permitted.")]

    use super::*;

    #[test]
    fn several_common_names_are_rejected() {
        let names = vec!["jdoe".to_string(), "other".to_string()];
        let err = select_common_name(names, Path::new("cert.pem")).expect_err("two names");
        assert_eq!(
            err,
            IdentityError::MultipleCommonNames {
                path: "cert.pem".to_string(),
                count: 2
            }
        );
    }

    #[test]
    fn single_common_name_is_selected() {
        let identity =
            select_common_name(vec!["jdoe".to_string()], Path::new("cert.pem")).expect("one name");
        assert_eq!(identity.as_str(), "jdoe");
    }

    #[test]
    fn common_name_is_kept_verbatim() {
        let identity = select_common_name(vec![" jdoe ".to_string()], Path::new("cert.pem"))
            .expect("one name");
        assert_eq!(identity.as_str(), " jdoe ");
    }

    #[test]
    fn blank_principal_is_invalid() {
        assert!(matches!(Identity::new("  "), Err(IdentityError::InvalidPrincipal(_))));
        assert!(matches!(Identity::new("a\nb"), Err(IdentityError::InvalidPrincipal(_))));
    }
}
