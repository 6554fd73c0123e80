//! Order aggregate: places orders for products and tracks their shipment.

mod commands;
mod entity;
mod events;
mod state;

pub use commands::{OrderCommand, PlaceOrder, ShipProduct};
pub use entity::OrderEntity;
pub use events::{OrderEvent, OrderPlacedData, ProductShippedData};
pub use state::{Order, OrderLine, OrderStatus};

use common::StreamId;
use thiserror::Error;

use crate::error::DomainError;

/// Stream type and entity type of orders.
pub const ORDER_STREAM_TYPE: &str = "Order";

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Amounts must be positive.
    #[error("Invalid amount: {amount} (must be greater than 0)")]
    InvalidAmount { amount: u64 },

    /// The product is not part of the order.
    #[error("Product not ordered: {product_id}")]
    ProductNotOrdered { product_id: StreamId },

    /// Shipping would exceed the ordered amount.
    #[error(
        "Cannot ship {requested} of {product_id}: {ordered} ordered, {shipped} already shipped"
    )]
    ShipmentExceedsOrder {
        product_id: StreamId,
        ordered: u64,
        shipped: u64,
        requested: u64,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),
}
