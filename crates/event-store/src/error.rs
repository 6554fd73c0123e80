use thiserror::Error;

use crate::codec::CodecError;
use crate::{StreamId, Version};

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Another writer claimed the expected version first.
    #[error(
        "Version conflict on {stream_type}/{stream_id}: expected version {expected}, found {actual}"
    )]
    VersionConflict {
        stream_type: String,
        stream_id: StreamId,
        expected: Version,
        actual: Version,
    },

    /// The storage backend could not be reached (connection loss, pool exhaustion).
    #[error("Storage unavailable: {0}")]
    Unavailable(sqlx::Error),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An event body could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The append request itself was malformed.
    #[error("Invalid append: {0}")]
    InvalidAppend(String),
}

impl EventStoreError {
    /// Returns true for optimistic-concurrency violations.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EventStoreError::VersionConflict { .. })
    }

    /// Returns true when the same operation may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EventStoreError::VersionConflict { .. } | EventStoreError::Unavailable(_)
        )
    }
}

impl From<sqlx::Error> for EventStoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => EventStoreError::Unavailable(error),
            other => EventStoreError::Database(other),
        }
    }
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
