use common::{Envelope, StreamId};

use crate::behaviour::EventSourced;

use super::{INVENTORY_STREAM_TYPE, InventoryEvent};

/// Event-sourced behaviour of inventories. The state is the units in stock.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inventory;

impl EventSourced for Inventory {
    type Event = Envelope<InventoryEvent>;
    type State = u64;

    fn stream_type(&self) -> &str {
        INVENTORY_STREAM_TYPE
    }

    fn initial_state(&self, _stream_id: &StreamId) -> u64 {
        0
    }

    fn evolve(&self, stock: &mut u64, event: &Envelope<InventoryEvent>) {
        match &event.body {
            InventoryEvent::Incremented(change) => *stock += change.amount,
            InventoryEvent::Decremented(change) => *stock = stock.saturating_sub(change.amount),
        }
    }
}
