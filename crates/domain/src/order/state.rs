//! Order state and its event fold.

use common::{Envelope, StreamId};
use serde::{Deserialize, Serialize};

use crate::behaviour::EventSourced;

use super::{ORDER_STREAM_TYPE, OrderEvent};

/// Ordered and shipped units of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: StreamId,
    pub amount: u64,
    pub shipped: u64,
}

impl OrderLine {
    /// Units ordered but not shipped yet.
    pub fn outstanding(&self) -> u64 {
        self.amount.saturating_sub(self.shipped)
    }
}

/// Lines of an order, in the order products were first mentioned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatus {
    lines: Vec<OrderLine>,
}

impl OrderStatus {
    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn line(&self, product_id: &StreamId) -> Option<&OrderLine> {
        self.lines.iter().find(|line| &line.product_id == product_id)
    }

    fn line_mut(&mut self, product_id: &StreamId) -> &mut OrderLine {
        let index = match self.lines.iter().position(|line| &line.product_id == product_id) {
            Some(index) => index,
            None => {
                self.lines.push(OrderLine {
                    product_id: product_id.clone(),
                    amount: 0,
                    shipped: 0,
                });
                self.lines.len() - 1
            }
        };
        &mut self.lines[index]
    }

    /// Returns true once every ordered unit has shipped.
    pub fn is_fulfilled(&self) -> bool {
        !self.lines.is_empty() && self.lines.iter().all(|line| line.outstanding() == 0)
    }
}

/// Event-sourced behaviour of orders.
#[derive(Debug, Clone, Copy, Default)]
pub struct Order;

impl EventSourced for Order {
    type Event = Envelope<OrderEvent>;
    type State = OrderStatus;

    fn stream_type(&self) -> &str {
        ORDER_STREAM_TYPE
    }

    fn initial_state(&self, _stream_id: &StreamId) -> OrderStatus {
        OrderStatus::default()
    }

    fn evolve(&self, state: &mut OrderStatus, event: &Envelope<OrderEvent>) {
        match &event.body {
            OrderEvent::OrderPlaced(data) => state.line_mut(&data.product_id).amount += data.amount,
            OrderEvent::ProductShipped(data) => {
                state.line_mut(&data.product_id).shipped += data.amount
            }
        }
    }
}
