//! Sample saga: keeps inventory in step with shipped orders.
//!
//! Every `ProductShipped` on the Order journal is routed to the saga
//! instance of its product, which decreases that product's stock by the
//! shipped amount.

use async_trait::async_trait;
use common::{Envelope, MessageId, StreamId};
use domain::inventory::Decrease;
use domain::{AtMostOnceEntity, DecodePolicy, InventoryCommand, ORDER_STREAM_TYPE, OrderEvent};
use event_store::{EventStore, JournalFilter, JournalOptions, Sequence};
use futures_util::stream::BoxStream;
use runtime::{Entity, EntityError, Messenger, Sharding};

use crate::error::Result;
use crate::journal::{JournalEvent, decoded_journal};

pub const DECREASE_STOCK_SAGA_TYPE: &str = "DecreaseStockOnShipment";

/// Order journal entry as seen by the saga.
pub type OrderJournalEvent = JournalEvent<Envelope<OrderEvent>>;

/// Routes shipments to the saga instance of the shipped product.
pub fn correlate(event: &OrderJournalEvent) -> Option<StreamId> {
    match &event.payload.body {
        OrderEvent::ProductShipped(data) => Some(data.product_id.clone()),
        OrderEvent::OrderPlaced(_) => None,
    }
}

/// Dedup key of a routed event: the id of the stored event envelope.
pub fn message_id(event: &OrderJournalEvent) -> Option<MessageId> {
    Some(event.payload.id.clone())
}

/// The Order journal after `from`. Events that no longer decode are skipped.
pub fn order_journal<S>(
    store: &S,
    from: Sequence,
    options: JournalOptions,
) -> BoxStream<'static, Result<OrderJournalEvent>>
where
    S: EventStore + Clone + 'static,
{
    decoded_journal(
        store,
        JournalFilter::stream_type(ORDER_STREAM_TYPE),
        from,
        options,
        DecodePolicy::Skip,
    )
}

/// Saga instance per product.
#[derive(Debug, Clone)]
pub struct DecreaseStockOnShipment {
    inventory: Messenger<InventoryCommand>,
}

impl DecreaseStockOnShipment {
    pub fn new(inventory: Messenger<InventoryCommand>) -> Self {
        Self { inventory }
    }

    /// Registers the saga behind an at-most-once guard keyed by [`message_id`].
    pub async fn register<S>(
        sharding: &Sharding,
        store: S,
        inventory: Messenger<InventoryCommand>,
    ) -> Messenger<OrderJournalEvent>
    where
        S: EventStore + Clone + 'static,
    {
        sharding
            .register(AtMostOnceEntity::new(Self::new(inventory), store, message_id))
            .await
    }
}

#[async_trait]
impl Entity for DecreaseStockOnShipment {
    type Message = OrderJournalEvent;
    type State = ();

    fn entity_type(&self) -> &str {
        DECREASE_STOCK_SAGA_TYPE
    }

    async fn start(&self, _product_id: &StreamId) -> std::result::Result<(), EntityError> {
        Ok(())
    }

    async fn receive(
        &self,
        product_id: &StreamId,
        _state: &mut (),
        event: OrderJournalEvent,
    ) -> std::result::Result<(), EntityError> {
        let OrderEvent::ProductShipped(shipped) = &event.payload.body else {
            return Ok(());
        };

        // Derived id: a redelivered shipment maps to the same inventory command.
        let mut decrease = event.payload.caused(Decrease {
            amount: shipped.amount,
        });
        decrease.id = MessageId::new(format!("{}/decrease", event.payload.id));

        self.inventory
            .send_discard(product_id, InventoryCommand::Decrease(decrease))
            .await?;
        let stock = self
            .inventory
            .send(product_id, |reply| InventoryCommand::GetCurrentStock { reply })
            .await?;

        tracing::info!(
            %product_id,
            order_id = %shipped.order_id,
            amount = shipped.amount,
            stock,
            "stock decreased after shipment"
        );
        Ok(())
    }
}
