// crates/kv-bridge-config/src/lib.rs
// ============================================================================
// Module: KV Bridge Config Library
// Description: Configuration model, environment overrides, and wiring.
// Purpose: Single source of truth for how a KV Bridge deployment is assembled.
// Dependencies: kv-bridge-core, kv-bridge-sftp, kv-bridge-store-*, toml
// ============================================================================

//! ## Overview
//! [`KvBridgeConfig`] is loaded from TOML, overridden from `KV_BRIDGE_*`
//! environment variables, validated fail-closed, and then turned into a log
//! sink and a storage backend.

pub mod config;
pub mod wiring;

pub use config::BackendConfig;
pub use config::BackendKind;
pub use config::CONFIG_ENV_VAR;
pub use config::ConfigError;
pub use config::DB_HOST_ENV_VAR;
pub use config::DB_NAME_ENV_VAR;
pub use config::DB_PORT_ENV_VAR;
pub use config::DB_SSLMODE_ENV_VAR;
pub use config::DB_USER_ENV_VAR;
pub use config::DEFAULT_LOG_FILE;
pub use config::KvBridgeConfig;
pub use config::LOG_FILE_ENV_VAR;
pub use config::LocalBackendSettings;
pub use config::LogSinkKind;
pub use config::LoggingConfig;
pub use config::SerializerFormat;
