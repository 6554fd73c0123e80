use async_trait::async_trait;
use common::{Envelope, StreamId};
use event_store::EventStore;
use runtime::{Entity, EntityError};

use crate::command::{CommandHandler, CommandOptions};

use super::{
    ORDER_STREAM_TYPE, Order, OrderCommand, OrderError, OrderEvent, OrderPlacedData, PlaceOrder,
    ProductShippedData, ShipProduct,
};

/// Runtime entity owning the order streams.
///
/// Each loop keeps the command handler of its order, so the projection is
/// read once at start and then only refreshed with new events.
#[derive(Debug, Clone)]
pub struct OrderEntity<S> {
    store: S,
    options: CommandOptions,
}

impl<S> OrderEntity<S> {
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

impl<S: EventStore> OrderEntity<S> {
    async fn place_order(
        handler: &mut CommandHandler<S, Order>,
        command: Envelope<PlaceOrder>,
    ) -> Result<(), OrderError> {
        let PlaceOrder { product_id, amount } = &command.body;
        if *amount == 0 {
            return Err(OrderError::InvalidAmount { amount: *amount });
        }

        let order_id = handler.stream_id().clone();
        handler
            .execute(|_, emit| {
                emit.emit(command.caused(OrderEvent::OrderPlaced(OrderPlacedData {
                    order_id: order_id.clone(),
                    product_id: product_id.clone(),
                    amount: *amount,
                })));
                Ok::<_, OrderError>(())
            })
            .await?;

        metrics::counter!("orders_placed_total").increment(1);
        tracing::info!(%order_id, %product_id, amount, "order placed");
        Ok(())
    }

    async fn ship_product(
        handler: &mut CommandHandler<S, Order>,
        command: Envelope<ShipProduct>,
    ) -> Result<(), OrderError> {
        let ShipProduct { product_id, amount } = &command.body;
        if *amount == 0 {
            return Err(OrderError::InvalidAmount { amount: *amount });
        }

        let order_id = handler.stream_id().clone();
        handler
            .execute(|state, emit| -> Result<(), OrderError> {
                let line = state
                    .line(product_id)
                    .ok_or_else(|| OrderError::ProductNotOrdered {
                        product_id: product_id.clone(),
                    })?;
                if line.shipped + amount > line.amount {
                    return Err(OrderError::ShipmentExceedsOrder {
                        product_id: product_id.clone(),
                        ordered: line.amount,
                        shipped: line.shipped,
                        requested: *amount,
                    });
                }

                emit.emit(command.caused(OrderEvent::ProductShipped(ProductShippedData {
                    order_id: order_id.clone(),
                    product_id: product_id.clone(),
                    amount: *amount,
                })));
                Ok(())
            })
            .await?;

        metrics::counter!("products_shipped_total").increment(1);
        tracing::info!(%order_id, %product_id, amount, "product shipped");
        Ok(())
    }
}

#[async_trait]
impl<S> Entity for OrderEntity<S>
where
    S: EventStore + Clone + 'static,
{
    type Message = OrderCommand;
    type State = CommandHandler<S, Order>;

    fn entity_type(&self) -> &str {
        ORDER_STREAM_TYPE
    }

    async fn start(&self, entity_id: &StreamId) -> Result<Self::State, EntityError> {
        let handler = CommandHandler::load_with_options(
            self.store.clone(),
            Order,
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
        message: OrderCommand,
    ) -> Result<(), EntityError> {
        match message {
            OrderCommand::PlaceOrder(command) => Self::place_order(handler, command).await?,
            OrderCommand::ShipProduct(command) => Self::ship_product(handler, command).await?,
            OrderCommand::GetOrderStatus(reply) => {
                handler.refresh().await?;
                reply.reply(handler.state().lines().to_vec());
            }
        }
        Ok(())
    }
}
