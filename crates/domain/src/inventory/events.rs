use serde::{Deserialize, Serialize};

use crate::behaviour::DomainEvent;

/// Events that can occur on an inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InventoryEvent {
    Incremented(StockChanged),
    Decremented(StockChanged),
}

/// Amount by which the stock changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChanged {
    pub amount: u64,
}

impl DomainEvent for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::Incremented(_) => "Incremented",
            InventoryEvent::Decremented(_) => "Decremented",
        }
    }
}
