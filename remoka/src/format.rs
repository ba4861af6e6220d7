//! Value serialization formats.

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Serialization or deserialization error.
#[derive(Debug, Error)]
pub enum FormatError {
    /// A value could not be serialized.
    #[error(transparent)]
    Serialize(Box<dyn std::error::Error + Send>),

    /// Stored bytes could not be deserialized.
    #[error(transparent)]
    Deserialize(Box<dyn std::error::Error + Send>),
}

/// Wire format for cached values.
///
/// The same logical value must produce the same bytes in every process
/// sharing a store, so the format is part of a cache's configuration,
/// not a per-call choice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValueFormat {
    /// Human-readable JSON via `serde_json`.
    #[default]
    Json,
    /// Compact binary via `bincode`.
    Bincode,
}

impl ValueFormat {
    /// Serialize `value` into its stored byte form.
    pub fn serialize<T: Serialize>(&self, value: &T) -> Result<Bytes, FormatError> {
        match self {
            ValueFormat::Json => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| FormatError::Serialize(Box::new(e))),
            ValueFormat::Bincode => bincode::serde::encode_to_vec(value, bincode::config::standard())
                .map(Bytes::from)
                .map_err(|e| FormatError::Serialize(Box::new(e))),
        }
    }

    /// Deserialize stored bytes back into a logical value.
    pub fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, FormatError> {
        match self {
            ValueFormat::Json => {
                serde_json::from_slice(data).map_err(|e| FormatError::Deserialize(Box::new(e)))
            }
            ValueFormat::Bincode => {
                bincode::serde::decode_from_slice(data, bincode::config::standard())
                    .map(|(value, _)| value)
                    .map_err(|e| FormatError::Deserialize(Box::new(e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip() {
        let raw = ValueFormat::Json.serialize(&vec![1u32, 2, 3]).unwrap();
        let back: Vec<u32> = ValueFormat::Json.deserialize(&raw).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }

    #[test]
    fn bincode_roundtrip() {
        let raw = ValueFormat::Bincode
            .serialize(&("key", 42u64))
            .unwrap();
        let back: (String, u64) = ValueFormat::Bincode.deserialize(&raw).unwrap();
        assert_eq!(back, ("key".to_owned(), 42));
    }

    #[test]
    fn deserialize_garbage_fails() {
        let result: Result<Vec<u32>, _> = ValueFormat::Json.deserialize(b"not json");
        assert!(matches!(result, Err(FormatError::Deserialize(_))));
    }
}
