//! Shared identifiers and the message envelope used across the workspace.

pub mod envelope;
pub mod types;

pub use envelope::Envelope;
pub use types::{MessageId, StreamId};
