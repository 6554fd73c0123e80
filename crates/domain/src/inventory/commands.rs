use common::{Envelope, MessageId};
use runtime::Replier;
use serde::{Deserialize, Serialize};

/// Adds units to the stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Increase {
    pub amount: u64,
}

/// Removes units from the stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decrease {
    pub amount: u64,
}

/// Messages accepted by the inventory entity.
///
/// Only the state-changing variants serialize; queries are never logged.
#[derive(Debug, Serialize)]
pub enum InventoryCommand {
    Increase(Envelope<Increase>),
    Decrease(Envelope<Decrease>),
    #[serde(skip_serializing)]
    GetCurrentStock { reply: Replier<u64> },
}

impl InventoryCommand {
    pub fn increase(amount: u64) -> Self {
        InventoryCommand::Increase(Envelope::new(Increase { amount }))
    }

    pub fn decrease(amount: u64) -> Self {
        InventoryCommand::Decrease(Envelope::new(Decrease { amount }))
    }

    /// Envelope id of state-changing commands; `None` for queries.
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            InventoryCommand::Increase(envelope) => Some(envelope.id.clone()),
            InventoryCommand::Decrease(envelope) => Some(envelope.id.clone()),
            InventoryCommand::GetCurrentStock { .. } => None,
        }
    }
}
