// crates/kv-bridge-sftp/src/lib.rs
// ============================================================================
// Module: KV Bridge SFTP Library
// Description: SFTP storage backend with certificate identity and ephemeral keys.
// Purpose: Store key-value data on a chrooted SFTP account.
// Dependencies: kv-bridge-core, postgres, russh, russh-sftp, rustls, x509-parser
// ============================================================================

//! ## Overview
//! The SFTP backend authenticates in two stages. The caller's identity comes
//! from an explicit principal or the CN of the local client certificate; that
//! identity then fetches a short-lived Ed25519 key from a Postgres credential
//! store, and the key opens an SFTP session on a low-privileged account.
//! Invariants:
//! - Key material lives only in memory and is wiped on teardown.
//! - One session per backend; sessions are never shared.
//! - No retries, timeouts, or cancellation are built in.
//!
//! Security posture: the remote host key is not verified. The gap is logged
//! on every connect; see [`session`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod backend;
pub mod credential;
pub mod identity;
pub mod key;
pub mod remote;
pub mod session;
pub mod storage;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use backend::SftpBackend;
pub use backend::SftpBackendConfig;
pub use backend::SftpBackendError;
pub use credential::CredentialError;
pub use credential::CredentialRecord;
pub use credential::CredentialStore;
pub use credential::PostgresCredentialConfig;
pub use credential::PostgresCredentialStore;
pub use credential::SslModeSetting;
pub use credential::TlsFiles;
pub use identity::Identity;
pub use identity::IdentityConfig;
pub use identity::IdentityError;
pub use identity::identity_from_pem;
pub use identity::resolve_identity;
pub use key::SessionKey;
pub use remote::EntryKind;
pub use remote::OpenMode;
pub use remote::RemoteAttributes;
pub use remote::RemoteEntry;
pub use remote::RemoteFile;
pub use remote::RemoteFileSystem;
pub use remote::SessionError;
pub use remote::SessionState;
pub use session::SftpEndpoint;
pub use session::SftpFile;
pub use session::SftpSession;
pub use storage::SftpStorage;
pub use storage::connect_data_storage;
pub use storage::connect_object_storage;
pub use storage::connect_storage;
pub use storage::connect_storage_with;
