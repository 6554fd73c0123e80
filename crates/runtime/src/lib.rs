//! Entity runtime.
//!
//! Every registered entity type gets one sequential loop per entity id. The
//! loop owns the entity's in-memory state and drains a bounded FIFO mailbox,
//! so at most one message is in flight per `(entity type, entity id)`.
//! Callers talk to the loops through a [`Messenger`].

pub mod entity;
pub mod error;
pub mod messenger;
pub mod sharding;

pub use common::StreamId;
pub use entity::{Entity, EntityError};
pub use error::{Result, RuntimeError};
pub use messenger::{Messenger, Replier, SendDiscard};
pub use sharding::{RuntimeConfig, Sharding};
