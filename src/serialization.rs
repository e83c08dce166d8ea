//! Deterministic bincode configuration for wire payloads.
//!
//! Uses fixed-size integer encoding and little-endian byte order so a
//! payload encodes identically on every platform, and rejects trailing
//! bytes so a crafted frame cannot smuggle data past the decoder.

use bincode::Options;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Serialization failures, kept separate from transport errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// Encoding a value failed.
    #[error("encode failed: {0}")]
    EncodeFailed(String),

    /// Decoding bytes failed.
    #[error("decode failed: {0}")]
    DecodeFailed(String),
}

fn config() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

/// Serialize a value to bytes using the deterministic configuration.
pub fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, SerializationError> {
    config()
        .serialize(value)
        .map_err(|e| SerializationError::EncodeFailed(e.to_string()))
}

/// Deserialize a value from bytes.
///
/// Fails if the bytes are malformed, carry trailing data, or do not match
/// the expected type.
pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SerializationError> {
    config()
        .deserialize(bytes)
        .map_err(|e| SerializationError::DecodeFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct TestPayload {
        offer_id: u64,
        data: Vec<u8>,
        tag: Option<u32>,
    }

    #[test]
    fn test_roundtrip() {
        let original = TestPayload {
            offer_id: 12345,
            data: vec![1, 2, 3],
            tag: Some(42),
        };

        let bytes = serialize(&original).unwrap();
        let recovered: TestPayload = deserialize(&bytes).unwrap();

        assert_eq!(original, recovered);
    }

    #[test]
    fn test_determinism() {
        let value = TestPayload {
            offer_id: 999,
            data: vec![7; 16],
            tag: None,
        };

        assert_eq!(serialize(&value).unwrap(), serialize(&value).unwrap());
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = serialize(&42u64).unwrap();
        bytes.push(0xFF);

        let result: Result<u64, _> = deserialize(&bytes);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_bytes() {
        let garbage = vec![0xFF, 0xFF, 0xFF];
        let result: Result<TestPayload, _> = deserialize(&garbage);
        assert!(result.is_err());
    }
}
