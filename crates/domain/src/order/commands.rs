//! Order commands.

use common::{Envelope, MessageId, StreamId};
use runtime::Replier;
use serde::{Deserialize, Serialize};

use super::OrderLine;

/// Command to order `amount` units of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub product_id: StreamId,
    pub amount: u64,
}

impl PlaceOrder {
    pub fn new(product_id: impl Into<StreamId>, amount: u64) -> Self {
        Self {
            product_id: product_id.into(),
            amount,
        }
    }
}

/// Command to ship `amount` units of an ordered product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipProduct {
    pub product_id: StreamId,
    pub amount: u64,
}

impl ShipProduct {
    pub fn new(product_id: impl Into<StreamId>, amount: u64) -> Self {
        Self {
            product_id: product_id.into(),
            amount,
        }
    }
}

/// Messages accepted by the order entity.
///
/// Only the state-changing variants serialize; queries are never logged.
#[derive(Debug, Serialize)]
pub enum OrderCommand {
    PlaceOrder(Envelope<PlaceOrder>),
    ShipProduct(Envelope<ShipProduct>),
    /// Replies with the order lines.
    #[serde(skip_serializing)]
    GetOrderStatus(Replier<Vec<OrderLine>>),
}

impl OrderCommand {
    pub fn place(command: PlaceOrder) -> Self {
        OrderCommand::PlaceOrder(Envelope::new(command))
    }

    pub fn ship(command: ShipProduct) -> Self {
        OrderCommand::ShipProduct(Envelope::new(command))
    }

    /// Envelope id of state-changing commands; `None` for queries.
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            OrderCommand::PlaceOrder(envelope) => Some(envelope.id.clone()),
            OrderCommand::ShipProduct(envelope) => Some(envelope.id.clone()),
            OrderCommand::GetOrderStatus(_) => None,
        }
    }
}
