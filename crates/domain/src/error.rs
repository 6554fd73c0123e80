//! Domain error types.

use common::StreamId;
use event_store::{CodecError, EventStoreError, Version};
use thiserror::Error;

/// Errors raised by the projection engine itself.
///
/// Decision functions return their own error type `E: From<DomainError>`, so
/// engine failures travel through the same channel as business rejections.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// An emitted event could not be encoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// A stored event of the entity's own stream could not be decoded.
    #[error("Cannot decode {stream_type}/{stream_id} at version {version}: {source}")]
    Decode {
        stream_type: String,
        stream_id: StreamId,
        version: Version,
        #[source]
        source: CodecError,
    },

    /// Every attempt allowed by the conflict policy hit a version conflict.
    #[error("Gave up on {stream_type}/{stream_id} after {attempts} conflicting attempts")]
    ConflictRetriesExhausted {
        stream_type: String,
        stream_id: StreamId,
        attempts: u32,
    },
}

impl DomainError {
    /// Returns true for conflicts, whether surfaced directly or after retries.
    pub fn is_conflict(&self) -> bool {
        match self {
            DomainError::EventStore(e) => e.is_conflict(),
            DomainError::ConflictRetriesExhausted { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_retries_count_as_conflict() {
        let err = DomainError::ConflictRetriesExhausted {
            stream_type: "Inventory".to_string(),
            stream_id: StreamId::new("product1"),
            attempts: 4,
        };
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "Gave up on Inventory/product1 after 4 conflicting attempts"
        );
    }

    #[test]
    fn invalid_append_is_not_a_conflict() {
        let err = DomainError::from(EventStoreError::InvalidAppend("empty id".to_string()));
        assert!(!err.is_conflict());
    }
}
