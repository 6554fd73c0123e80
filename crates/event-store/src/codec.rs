//! Byte encoding of event and message payloads.
//!
//! Bodies are stored as opaque bytes; this module is the single place that
//! decides their wire format (JSON).

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Failure to move a payload across the byte boundary.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encodes a value to bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(CodecError::Encode)
}

/// Decodes a value from bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(CodecError::Decode)
}
