//! Inventory aggregate: stock levels per product.

mod commands;
mod entity;
mod events;
mod state;

pub use commands::{Decrease, Increase, InventoryCommand};
pub use entity::InventoryEntity;
pub use events::{InventoryEvent, StockChanged};
pub use state::Inventory;

use thiserror::Error;

use crate::error::DomainError;

/// Stream type and entity type of inventories.
pub const INVENTORY_STREAM_TYPE: &str = "Inventory";

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Invalid amount: {amount} (must be greater than 0)")]
    InvalidAmount { amount: u64 },

    /// Stock never goes below zero.
    #[error("Insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: u64, requested: u64 },

    #[error(transparent)]
    Domain(#[from] DomainError),
}
