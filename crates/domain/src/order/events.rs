//! Order domain events.

use common::StreamId;
use serde::{Deserialize, Serialize};

use crate::behaviour::DomainEvent;

/// Events that can occur on an order aggregate.
///
/// Stored wrapped in an [`Envelope`](common::Envelope) caused by the command
/// that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Units of a product were ordered.
    OrderPlaced(OrderPlacedData),

    /// Units of an ordered product were shipped.
    ProductShipped(ProductShippedData),
}

impl OrderEvent {
    /// The product the event is about.
    pub fn product_id(&self) -> &StreamId {
        match self {
            OrderEvent::OrderPlaced(data) => &data.product_id,
            OrderEvent::ProductShipped(data) => &data.product_id,
        }
    }
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::ProductShipped(_) => "ProductShipped",
        }
    }
}

/// Data for OrderPlaced event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: StreamId,
    pub product_id: StreamId,
    pub amount: u64,
}

/// Data for ProductShipped event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductShippedData {
    pub order_id: StreamId,
    pub product_id: StreamId,
    pub amount: u64,
}
