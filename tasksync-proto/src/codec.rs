//! JSON encoding for persisted `TaskSync` records.
//!
//! Every value the storage collaborator holds (task collections, the
//! outbox, settings, the remote shadow collection) goes through these
//! helpers so that failures surface as one error type.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),
    /// The stored text is not valid JSON for the requested type.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Encodes a value as a JSON string.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the value cannot be serialized.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decodes a value from a JSON string.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the text is not valid for `T`.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Decodes a value from raw bytes (which must be UTF-8 JSON).
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the bytes are not UTF-8 or not valid JSON for `T`.
pub fn decode_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}
