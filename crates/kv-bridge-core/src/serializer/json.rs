// crates/kv-bridge-core/src/serializer/json.rs
// ============================================================================
// Module: JSON Serializer
// Description: serde_json codec for general nested values and typed records.
// Purpose: Encode mapping/sequence/scalar values as UTF-8 JSON.
// Dependencies: serde, serde_json
// ============================================================================

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::Serializer;
use super::SerializerError;

/// JSON codec for any serde-compatible value type.
///
/// `JsonSerializer<serde_json::Value>` covers arbitrary nested data; a concrete
/// record type gives a typed contract.
pub struct JsonSerializer<T> {
    /// Marker for the encoded value type.
    marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerializer<T> {
    /// Creates a JSON serializer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            marker: PhantomData,
        }
    }
}

impl<T> Default for JsonSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonSerializer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonSerializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonSerializer")
    }
}

impl<T> Serializer for JsonSerializer<T>
where
    T: Serialize + DeserializeOwned,
{
    type Value = T;

    fn serialize(&self, value: &T) -> Result<Vec<u8>, SerializerError> {
        serde_json::to_vec(value).map_err(|err| SerializerError::Serialize(err.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T, SerializerError> {
        serde_json::from_slice(bytes).map_err(|err| SerializerError::Deserialize(err.to_string()))
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}
