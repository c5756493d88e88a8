// crates/kv-bridge-core/src/serializer/binary.rs
// ============================================================================
// Module: Bincode Serializer
// Description: Compact binary object codec built on bincode's serde mode.
// Purpose: Persist arbitrary Rust objects without a textual representation.
// Dependencies: bincode, serde
// ============================================================================

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::Serializer;
use super::SerializerError;

/// Binary object codec using the bincode standard configuration.
///
/// Decoding rejects trailing bytes so a truncated or concatenated payload is
/// never mistaken for a valid object.
pub struct BincodeSerializer<T> {
    /// Marker for the encoded value type.
    marker: PhantomData<fn() -> T>,
}

impl<T> BincodeSerializer<T> {
    /// Creates a bincode serializer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BincodeSerializer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BincodeSerializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BincodeSerializer")
    }
}

impl<T> Serializer for BincodeSerializer<T>
where
    T: Serialize + DeserializeOwned,
{
    type Value = T;

    fn serialize(&self, value: &T) -> Result<Vec<u8>, SerializerError> {
        bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(|err| SerializerError::Serialize(err.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T, SerializerError> {
        let (value, consumed) =
            bincode::serde::decode_from_slice::<T, _>(bytes, bincode::config::standard())
                .map_err(|err| SerializerError::Deserialize(err.to_string()))?;
        if consumed != bytes.len() {
            return Err(SerializerError::Deserialize(format!(
                "{} trailing bytes after object",
                bytes.len() - consumed
            )));
        }
        Ok(value)
    }

    fn extension(&self) -> &'static str {
        "bin"
    }
}
