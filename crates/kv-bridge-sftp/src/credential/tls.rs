// crates/kv-bridge-sftp/src/credential/tls.rs
// ============================================================================
// Module: Credential Store TLS
// Description: rustls client configuration for the credential database.
// Purpose: Present the libpq client certificate and honor the sslmode.
// Dependencies: rustls, rustls-pki-types, serde
// ============================================================================

//! ## Overview
//! Mirrors libpq defaults: the client certificate and key live under
//! `~/.postgresql/`, and only `verify_full` checks the server chain against
//! `root.crt`. `prefer` and `require` encrypt without authenticating the
//! server, matching libpq behavior for those modes.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use rustls::ClientConfig;
use rustls::DigitallySignedStruct;
use rustls::RootCertStore;
use rustls::SignatureScheme;
use rustls::client::danger::HandshakeSignatureValid;
use rustls::client::danger::ServerCertVerified;
use rustls::client::danger::ServerCertVerifier;
use rustls::crypto::CryptoProvider;
use rustls::crypto::verify_tls12_signature;
use rustls::crypto::verify_tls13_signature;
use rustls_pki_types::CertificateDer;
use rustls_pki_types::PrivateKeyDer;
use rustls_pki_types::ServerName;
use rustls_pki_types::UnixTime;
use rustls_pki_types::pem::PemObject;
use serde::Deserialize;
use serde::Serialize;

use super::CredentialError;
use super::SslModeSetting;

/// Client certificate, key, and trust anchor locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsFiles {
    /// PEM client certificate presented to the server.
    #[serde(default = "default_client_certificate")]
    pub client_certificate: PathBuf,
    /// PEM private key matching the client certificate.
    #[serde(default = "default_client_key")]
    pub client_key: PathBuf,
    /// PEM trust anchors for `verify_full`.
    #[serde(default = "default_root_certificate")]
    pub root_certificate: PathBuf,
}

impl Default for TlsFiles {
    fn default() -> Self {
        Self {
            client_certificate: default_client_certificate(),
            client_key: default_client_key(),
            root_certificate: default_root_certificate(),
        }
    }
}

/// Resolves a file under `~/.postgresql/`.
fn postgresql_file(name: &str) -> PathBuf {
    let relative = Path::new(".postgresql").join(name);
    dirs::home_dir().map_or_else(|| relative.clone(), |home| home.join(&relative))
}

/// Default client certificate path.
fn default_client_certificate() -> PathBuf {
    postgresql_file("postgresql.crt")
}

/// Default client key path.
fn default_client_key() -> PathBuf {
    postgresql_file("postgresql.key")
}

/// Default root certificate path.
fn default_root_certificate() -> PathBuf {
    postgresql_file("root.crt")
}

/// Builds the rustls client configuration for a TLS mode.
///
/// The client certificate is presented when both it and its key exist.
///
/// # Errors
///
/// Returns [`CredentialError::Store`] when PEM material cannot be loaded.
pub(crate) fn client_config(
    files: &TlsFiles,
    mode: SslModeSetting,
) -> Result<ClientConfig, CredentialError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|err| CredentialError::Store(err.to_string()))?;
    let builder = if mode == SslModeSetting::VerifyFull {
        builder.with_root_certificates(load_roots(&files.root_certificate)?)
    } else {
        builder.dangerous().with_custom_certificate_verifier(Arc::new(NoServerVerification {
            provider,
        }))
    };
    if files.client_certificate.is_file() && files.client_key.is_file() {
        let certs = load_certificates(&files.client_certificate)?;
        let key = PrivateKeyDer::from_pem_file(&files.client_key)
            .map_err(|err| tls_error(&files.client_key, &err))?;
        builder
            .with_client_auth_cert(certs, key)
            .map_err(|err| CredentialError::Store(err.to_string()))
    } else {
        Ok(builder.with_no_client_auth())
    }
}

/// Loads every certificate in a PEM file.
fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, CredentialError> {
    CertificateDer::pem_file_iter(path)
        .map_err(|err| tls_error(path, &err))?
        .map(|cert| cert.map_err(|err| tls_error(path, &err)))
        .collect()
}

/// Loads trust anchors from a PEM file.
fn load_roots(path: &Path) -> Result<RootCertStore, CredentialError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certificates(path)? {
        roots.add(cert).map_err(|err| CredentialError::Store(err.to_string()))?;
    }
    Ok(roots)
}

/// Formats a PEM loading failure with its path.
fn tls_error(path: &Path, err: &impl std::fmt::Display) -> CredentialError {
    CredentialError::Store(format!("tls material {}: {err}", path.display()))
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct NoServerVerification {
    /// Provider supplying signature algorithms.
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NoServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
