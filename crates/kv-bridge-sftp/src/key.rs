// crates/kv-bridge-sftp/src/key.rs
// ============================================================================
// Module: Session Key
// Description: Parse the ephemeral OpenSSH Ed25519 key from a credential.
// Purpose: Turn credential text into authentication material.
// Dependencies: russh
// ============================================================================

//! ## Overview
//! The credential store hands back an OpenSSH private key. Only Ed25519 keys
//! are accepted. The parsed key is held behind an [`Arc`] so the SSH
//! authenticator can borrow it; the last owner drops it on teardown and the
//! underlying key type wipes its secret bytes on drop.

use std::fmt;
use std::sync::Arc;

use russh::keys::HashAlg;
use russh::keys::PrivateKey;
use russh::keys::decode_secret_key;
use russh::keys::ssh_key::Algorithm;

use crate::credential::CredentialError;
use crate::credential::CredentialRecord;

/// Parsed Ed25519 private key used for SSH authentication.
#[derive(Clone)]
pub struct SessionKey {
    /// Parsed private key.
    key: Arc<PrivateKey>,
}

impl SessionKey {
    /// Parses an OpenSSH private key from a credential record.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::KeyParse`] when the text is not an
    /// unencrypted OpenSSH Ed25519 private key.
    pub fn parse(record: &CredentialRecord) -> Result<Self, CredentialError> {
        let key = decode_secret_key(record.expose(), None)
            .map_err(|err| CredentialError::KeyParse(err.to_string()))?;
        if key.algorithm() != Algorithm::Ed25519 {
            return Err(CredentialError::KeyParse(format!(
                "expected an ed25519 key, got {}",
                key.algorithm().as_str()
            )));
        }
        Ok(Self {
            key: Arc::new(key),
        })
    }

    /// Returns the SHA-256 fingerprint of the public half.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        self.key.public_key().fingerprint(HashAlg::Sha256).to_string()
    }

    /// Returns the shared key for the authenticator.
    pub(crate) fn auth_key(&self) -> Arc<PrivateKey> {
        Arc::clone(&self.key)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey").field("fingerprint", &self.fingerprint()).finish()
    }
}
