//! Domain layer for the event-sourcing system.
//!
//! This crate provides:
//! - [`EventSourced`] behaviours that fold stream events into state
//! - [`CommandHandler`] for running commands against a stream under
//!   optimistic concurrency
//! - delivery guards for at-most-once and at-least-once handling
//! - the Order and Inventory aggregates and their runtime entities

pub mod behaviour;
pub mod command;
pub mod delivery;
pub mod error;
pub mod inventory;
pub mod order;
pub mod projection;

pub use behaviour::{DomainEvent, EventSourced};
pub use command::{CommandHandler, CommandOptions, CommandOutcome, ConflictPolicy, Emitter};
pub use delivery::{
    AtLeastOnce, AtLeastOnceEntity, AtMostOnce, AtMostOnceEntity, Delivery, DeliveryLog,
    DeliveryRecord, EventStoreDeliveryLog,
};
pub use error::DomainError;
pub use inventory::{
    INVENTORY_STREAM_TYPE, Inventory, InventoryCommand, InventoryEntity, InventoryError,
    InventoryEvent,
};
pub use order::{
    ORDER_STREAM_TYPE, Order, OrderCommand, OrderEntity, OrderError, OrderEvent, OrderLine,
    OrderStatus, PlaceOrder, ShipProduct,
};
pub use projection::{DecodePolicy, LiveProjection, Projection};
