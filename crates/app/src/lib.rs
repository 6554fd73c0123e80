//! Wires the Order/Inventory sample onto the runtime.
//!
//! [`App`] registers the entities, starts the shipment saga and its router,
//! and can run the sample scenario: stock a product, order it, ship it, and
//! watch the saga decrease the stock.

pub mod config;
pub mod error;

use std::time::Duration;

use common::StreamId;
use domain::{
    AtMostOnceEntity, InventoryCommand, InventoryEntity, OrderCommand, OrderEntity, PlaceOrder,
    ShipProduct,
};
use event_store::{EventStore, Sequence};
use runtime::{Messenger, Sharding};
use saga::decrease_stock::{correlate, order_journal};
use saga::{DECREASE_STOCK_SAGA_TYPE, DecreaseStockOnShipment, SagaRouter};
use tokio::task::JoinHandle;

pub use config::Config;
pub use error::AppError;

const SAMPLE_ORDER_ID: &str = "order1";
const SAMPLE_PRODUCT_ID: &str = "product1";
const SCENARIO_TIMEOUT: Duration = Duration::from_secs(10);

/// The running system.
pub struct App {
    sharding: Sharding,
    orders: Messenger<OrderCommand>,
    inventory: Messenger<InventoryCommand>,
    router: JoinHandle<saga::Result<()>>,
}

impl App {
    /// Registers every entity and starts routing the Order journal.
    ///
    /// The router always starts from the beginning of the journal; the
    /// saga's at-most-once guard drops shipments it already handled.
    pub async fn start<S>(store: S, config: &Config) -> Self
    where
        S: EventStore + Clone + 'static,
    {
        let sharding = Sharding::new(config.runtime_config());
        let options = config.command_options();

        let orders = sharding
            .register(OrderEntity::new(store.clone()).with_options(options))
            .await;
        let inventory = sharding
            .register(
                AtMostOnceEntity::new(
                    InventoryEntity::new(store.clone()).with_options(options),
                    store.clone(),
                    InventoryCommand::message_id,
                )
                .with_options(options),
            )
            .await;
        let sagas = DecreaseStockOnShipment::register(&sharding, store.clone(), inventory.clone()).await;

        let router = SagaRouter::new(DECREASE_STOCK_SAGA_TYPE, sagas, correlate).spawn(
            order_journal(&store, Sequence::start(), config.journal_options()),
        );

        tracing::info!(mailbox_capacity = config.mailbox_capacity, "runtime started");
        Self {
            sharding,
            orders,
            inventory,
            router,
        }
    }

    pub fn orders(&self) -> &Messenger<OrderCommand> {
        &self.orders
    }

    pub fn inventory(&self) -> &Messenger<InventoryCommand> {
        &self.inventory
    }

    pub async fn current_stock(&self, product_id: &StreamId) -> Result<u64, AppError> {
        let stock = self
            .inventory
            .send(product_id, |reply| InventoryCommand::GetCurrentStock { reply })
            .await?;
        Ok(stock)
    }

    /// Stocks 12 units, orders 10 and ships them, then waits for the
    /// saga to take the shipped units out of stock.
    ///
    /// Returns the final stock, two more than before the run.
    #[tracing::instrument(skip(self))]
    pub async fn run_sample_scenario(&self) -> Result<u64, AppError> {
        let order_id = StreamId::new(SAMPLE_ORDER_ID);
        let product_id = StreamId::new(SAMPLE_PRODUCT_ID);

        let before = self.current_stock(&product_id).await?;
        self.inventory
            .send_discard(&product_id, InventoryCommand::increase(12))
            .await?;
        self.orders
            .send_discard(
                &order_id,
                OrderCommand::place(PlaceOrder::new(product_id.clone(), 10)),
            )
            .await?;
        self.orders
            .send_discard(
                &order_id,
                OrderCommand::ship(ShipProduct::new(product_id.clone(), 10)),
            )
            .await?;

        let lines = self.orders.send(&order_id, OrderCommand::GetOrderStatus).await?;
        tracing::info!(%order_id, ?lines, "order status");

        let expected = before + 2;
        let deadline = tokio::time::Instant::now() + SCENARIO_TIMEOUT;
        loop {
            let actual = self.current_stock(&product_id).await?;
            if actual == expected {
                tracing::info!(%product_id, stock = actual, "sample scenario finished");
                return Ok(actual);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::StockMismatch {
                    product_id,
                    expected,
                    actual,
                });
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Stops the router, then drains and stops every entity loop.
    pub async fn shutdown(self) {
        self.router.abort();
        self.sharding.shutdown().await;
        tracing::info!("runtime shut down");
    }
}
