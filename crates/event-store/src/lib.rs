//! Append-only event storage.
//!
//! Every event belongs to one `(stream_type, stream_id)` stream, where its
//! [`Version`] is the optimistic-concurrency token, and to the global journal,
//! where its [`Sequence`] orders it against every other stream.

pub mod codec;
pub mod error;
pub mod event;
pub mod journal;
pub mod memory;
pub mod postgres;
pub mod store;

pub use codec::CodecError;
pub use common::StreamId;
pub use error::{EventStoreError, Result};
pub use event::{PersistedEvent, Sequence, Version};
pub use journal::{JournalFilter, JournalOptions};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{EventStore, EventStoreExt, EventStream};
