// crates/kv-bridge-core/src/serializer.rs
// ============================================================================
// Module: Serializer Contract
// Description: Bidirectional mapping between typed values and bytes.
// Purpose: Define the codec seam injected into the key-value store.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! A [`Serializer`] turns values of one domain into bytes and back. Every
//! implementation must satisfy the round-trip law: for an in-domain value `v`,
//! `deserialize(serialize(v)) == v`.
//!
//! Shipped codecs:
//! - [`JsonSerializer`] for nested mappings, sequences, scalars, and records.
//! - [`BincodeSerializer`] for compact binary object encoding.
//! - [`CsvSerializer`] for typed [`Table`] values.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod binary;
mod json;
mod table;

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use binary::BincodeSerializer;
pub use json::JsonSerializer;
pub use table::Column;
pub use table::ColumnData;
pub use table::CsvSerializer;
pub use table::Table;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Serializer errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializerError {
    /// The value is outside the serializer's supported domain.
    #[error("serialization error: {0}")]
    Serialize(String),
    /// The bytes could not be decoded into a value.
    #[error("deserialization error: {0}")]
    Deserialize(String),
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Codec between a value domain and a byte sequence.
pub trait Serializer {
    /// Value domain handled by the serializer.
    type Value;

    /// Encodes a value into bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SerializerError::Serialize`] when the value is outside the
    /// supported domain.
    fn serialize(&self, value: &Self::Value) -> Result<Vec<u8>, SerializerError>;

    /// Decodes bytes into a value.
    ///
    /// # Errors
    ///
    /// Returns [`SerializerError::Deserialize`] when the bytes are malformed.
    fn deserialize(&self, bytes: &[u8]) -> Result<Self::Value, SerializerError>;

    /// File extension conventionally used for this encoding, without a dot.
    fn extension(&self) -> &'static str;
}
