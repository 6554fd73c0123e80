//! Saga manager: a singleton per saga type that tracks running saga
//! instances and broadcasts events to them with acknowledgement.
//!
//! A broadcast is remembered until every saga that was running when it
//! started acknowledges it (or completes). Redelivery piggybacks on acks:
//! when a saga acknowledges one event, the manager re-sends it the next
//! event it still owes an ack for.

mod client;
mod commands;
mod entity;
mod state;

pub use client::{MANAGER_ID, SagaManagerClient};
pub use commands::{Fanout, SagaManagerCommand};
pub use entity::SagaManagerEntity;
pub use state::{
    SagaManagerBehaviour, SagaManagerEvent, SagaManagerState, SagaMessage, manager_type,
};
