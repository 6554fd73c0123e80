use common::StreamId;
use thiserror::Error;

/// Errors surfaced to callers of a [`Messenger`](crate::Messenger).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The entity loop is gone and cannot accept the message.
    #[error("mailbox of {entity_type}/{entity_id} is closed")]
    MailboxClosed {
        entity_type: String,
        entity_id: StreamId,
    },

    /// The entity dropped the reply handle without answering.
    #[error("{entity_type}/{entity_id} did not reply")]
    NoReply {
        entity_type: String,
        entity_id: StreamId,
    },

    /// The runtime is shutting down and no longer spawns entity loops.
    #[error("runtime is shut down, {entity_type} no longer accepts messages")]
    ShutDown { entity_type: String },
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
