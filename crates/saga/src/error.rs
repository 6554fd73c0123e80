//! Saga error types.

use domain::DomainError;
use event_store::{CodecError, EventStoreError};
use runtime::RuntimeError;
use thiserror::Error;

/// Errors that can occur during saga routing and management.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// A message could not reach its entity.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Event store error.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// A journal payload could not be decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
