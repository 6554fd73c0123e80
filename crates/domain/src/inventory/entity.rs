use async_trait::async_trait;
use common::{Envelope, StreamId};
use event_store::EventStore;
use runtime::{Entity, EntityError};

use crate::command::{CommandHandler, CommandOptions};

use super::{
    Decrease, INVENTORY_STREAM_TYPE, Increase, Inventory, InventoryCommand, InventoryError,
    InventoryEvent, StockChanged,
};

/// Runtime entity owning the inventory streams, one per product.
#[derive(Debug, Clone)]
pub struct InventoryEntity<S> {
    store: S,
    options: CommandOptions,
}

impl<S> InventoryEntity<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            options: CommandOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CommandOptions) -> Self {
        self.options = options;
        self
    }
}

impl<S: EventStore> InventoryEntity<S> {
    async fn increase(
        handler: &mut CommandHandler<S, Inventory>,
        command: Envelope<Increase>,
    ) -> Result<u64, InventoryError> {
        let amount = command.body.amount;
        if amount == 0 {
            return Err(InventoryError::InvalidAmount { amount });
        }

        handler
            .execute(|_, emit| {
                emit.emit(command.caused(InventoryEvent::Incremented(StockChanged { amount })));
                Ok::<_, InventoryError>(())
            })
            .await?;

        let stock = *handler.state();
        tracing::info!(product_id = %handler.stream_id(), amount, stock, "stock increased");
        Ok(stock)
    }

    async fn decrease(
        handler: &mut CommandHandler<S, Inventory>,
        command: Envelope<Decrease>,
    ) -> Result<u64, InventoryError> {
        let amount = command.body.amount;
        if amount == 0 {
            return Err(InventoryError::InvalidAmount { amount });
        }

        handler
            .execute(|stock, emit| {
                if *stock < amount {
                    return Err(InventoryError::InsufficientStock {
                        available: *stock,
                        requested: amount,
                    });
                }
                emit.emit(command.caused(InventoryEvent::Decremented(StockChanged { amount })));
                Ok(())
            })
            .await?;

        let stock = *handler.state();
        tracing::info!(product_id = %handler.stream_id(), amount, stock, "stock decreased");
        Ok(stock)
    }
}

#[async_trait]
impl<S> Entity for InventoryEntity<S>
where
    S: EventStore + Clone + 'static,
{
    type Message = InventoryCommand;
    type State = CommandHandler<S, Inventory>;

    fn entity_type(&self) -> &str {
        INVENTORY_STREAM_TYPE
    }

    async fn start(&self, entity_id: &StreamId) -> Result<Self::State, EntityError> {
        let handler = CommandHandler::load_with_options(
            self.store.clone(),
            Inventory,
            entity_id.clone(),
            self.options,
        )
        .await?;
        Ok(handler)
    }

    async fn receive(
        &self,
        _entity_id: &StreamId,
        handler: &mut Self::State,
        message: InventoryCommand,
    ) -> Result<(), EntityError> {
        match message {
            InventoryCommand::Increase(command) => {
                Self::increase(handler, command).await?;
            }
            InventoryCommand::Decrease(command) => {
                Self::decrease(handler, command).await?;
            }
            InventoryCommand::GetCurrentStock { reply } => {
                handler.refresh().await?;
                reply.reply(*handler.state());
            }
        }
        Ok(())
    }
}
