//! Integration tests for the Order and Inventory aggregates.
//!
//! These tests drive the entities through the runtime, rebuild them from
//! the store, and exercise the concurrency and delivery guarantees.

use std::time::Duration;

use common::{Envelope, StreamId};
use domain::inventory::Increase;
use domain::order::OrderPlacedData;
use domain::{
    AtLeastOnceEntity, AtMostOnceEntity, CommandHandler, CommandOptions, ConflictPolicy,
    DecodePolicy, DomainError, EventStoreDeliveryLog, INVENTORY_STREAM_TYPE, Inventory,
    InventoryCommand, InventoryEntity, InventoryError, InventoryEvent, ORDER_STREAM_TYPE, Order,
    OrderCommand, OrderEntity, OrderEvent, PlaceOrder, ShipProduct,
};
use event_store::{EventStore, InMemoryEventStore, Version, codec};
use runtime::Sharding;

async fn current_stock(
    inventory: &runtime::Messenger<InventoryCommand>,
    product_id: &StreamId,
) -> u64 {
    inventory
        .send(product_id, |reply| InventoryCommand::GetCurrentStock { reply })
        .await
        .unwrap()
}

mod order_lifecycle {
    use super::*;

    #[tokio::test]
    async fn place_and_ship_through_the_runtime() {
        let store = InMemoryEventStore::new();
        let sharding = Sharding::default();
        let orders = sharding.register(OrderEntity::new(store.clone())).await;
        let order_id = StreamId::new("order1");

        for command in [
            OrderCommand::place(PlaceOrder::new("product1", 10)),
            OrderCommand::place(PlaceOrder::new("product2", 2)),
            OrderCommand::ship(ShipProduct::new("product1", 4)),
            OrderCommand::ship(ShipProduct::new("product1", 6)),
        ] {
            orders.send_discard(&order_id, command).await.unwrap();
        }

        let lines = orders
            .send(&order_id, OrderCommand::GetOrderStatus)
            .await
            .unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!((lines[0].amount, lines[0].shipped), (10, 10));
        assert_eq!((lines[1].amount, lines[1].shipped), (2, 0));

        assert_eq!(
            store.stream_version(ORDER_STREAM_TYPE, &order_id).await.unwrap(),
            Version::new(4)
        );
        sharding.shutdown().await;
    }

    #[tokio::test]
    async fn state_is_rebuilt_from_the_store() {
        let store = InMemoryEventStore::new();
        let product_id = StreamId::new("product1");

        let sharding = Sharding::default();
        let inventory = sharding.register(InventoryEntity::new(store.clone())).await;
        inventory
            .send_discard(&product_id, InventoryCommand::increase(12))
            .await
            .unwrap();
        inventory
            .send_discard(&product_id, InventoryCommand::decrease(10))
            .await
            .unwrap();
        assert_eq!(current_stock(&inventory, &product_id).await, 2);
        sharding.shutdown().await;

        // A new runtime over the same store replays the stream.
        let restarted = Sharding::default();
        let inventory = restarted.register(InventoryEntity::new(store.clone())).await;
        assert_eq!(current_stock(&inventory, &product_id).await, 2);

        let handler = CommandHandler::load(store, Inventory, product_id).await.unwrap();
        assert_eq!(*handler.state(), 2);
        assert_eq!(handler.version(), Version::new(2));
        restarted.shutdown().await;
    }

    #[tokio::test]
    async fn replay_is_deterministic() {
        let store = InMemoryEventStore::new();
        let order_id = StreamId::new("order1");
        let sharding = Sharding::default();
        let orders = sharding.register(OrderEntity::new(store.clone())).await;
        orders
            .send_discard(&order_id, OrderCommand::place(PlaceOrder::new("product1", 3)))
            .await
            .unwrap();
        orders
            .send_discard(&order_id, OrderCommand::ship(ShipProduct::new("product1", 1)))
            .await
            .unwrap();
        let _ = orders.send(&order_id, OrderCommand::GetOrderStatus).await;
        sharding.shutdown().await;

        let first = CommandHandler::load(store.clone(), Order, order_id.clone())
            .await
            .unwrap();
        let second = CommandHandler::load(store, Order, order_id).await.unwrap();
        assert_eq!(first.projection(), second.projection());
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_handlers_retry_until_every_command_lands() {
        let store = InMemoryEventStore::new();
        let product_id = StreamId::new("product1");
        let options = CommandOptions::default().conflict_policy(ConflictPolicy::Retry {
            max_retries: 50,
            backoff: Duration::from_millis(1),
        });

        let mut tasks = Vec::new();
        for _ in 0..2 {
            let mut handler = CommandHandler::new(store.clone(), Inventory, product_id.clone())
                .with_options(options);
            tasks.push(tokio::spawn(async move {
                for _ in 0..20 {
                    let command = Envelope::new(Increase { amount: 1 });
                    handler
                        .execute(|_, emit| {
                            emit.emit(command.caused(InventoryEvent::Incremented(
                                domain::inventory::StockChanged { amount: 1 },
                            )));
                            Ok::<_, DomainError>(())
                        })
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let handler = CommandHandler::load(store, Inventory, product_id).await.unwrap();
        assert_eq!(*handler.state(), 40);
        assert_eq!(handler.version(), Version::new(40));
    }

    #[tokio::test]
    async fn stale_handler_catches_up_before_deciding() {
        let store = InMemoryEventStore::new();
        let product_id = StreamId::new("product1");
        let mut stale = CommandHandler::load(store.clone(), Inventory, product_id.clone())
            .await
            .unwrap();
        let mut fresh = CommandHandler::load(store.clone(), Inventory, product_id)
            .await
            .unwrap();

        fresh
            .execute(|_, emit| {
                emit.emit(Envelope::new(InventoryEvent::Incremented(
                    domain::inventory::StockChanged { amount: 5 },
                )));
                Ok::<_, DomainError>(())
            })
            .await
            .unwrap();
        assert_eq!(*stale.state(), 0);

        let seen = stale
            .execute(|stock, _| Ok::<_, DomainError>(*stock))
            .await
            .unwrap();
        assert_eq!(seen.value, 5);
        assert_eq!(seen.events_committed, 0);
    }
}

mod error_handling {
    use super::*;

    async fn order_stream_with_garbage(store: &InMemoryEventStore, order_id: &StreamId) {
        let placed = Envelope::new(OrderEvent::OrderPlaced(OrderPlacedData {
            order_id: order_id.clone(),
            product_id: StreamId::new("product1"),
            amount: 4,
        }));
        store
            .persist_events(
                ORDER_STREAM_TYPE,
                order_id,
                Version::initial(),
                vec![codec::encode(&placed).unwrap(), b"not an order event".to_vec()],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn undecodable_event_fails_the_load_by_default() {
        let store = InMemoryEventStore::new();
        let order_id = StreamId::new("order1");
        order_stream_with_garbage(&store, &order_id).await;

        let result = CommandHandler::load(store, Order, order_id).await;
        match result {
            Err(DomainError::Decode { version, .. }) => assert_eq!(version, Version::new(2)),
            Err(other) => panic!("expected decode error, got {other:?}"),
            Ok(_) => panic!("expected decode error"),
        }
    }

    #[tokio::test]
    async fn skip_policy_steps_over_undecodable_events() {
        let store = InMemoryEventStore::new();
        let order_id = StreamId::new("order1");
        order_stream_with_garbage(&store, &order_id).await;

        let options = CommandOptions::default().decode_policy(DecodePolicy::Skip);
        let handler = CommandHandler::load_with_options(store, Order, order_id, options)
            .await
            .unwrap();
        assert_eq!(handler.version(), Version::new(2));
        assert_eq!(handler.state().lines()[0].amount, 4);
    }

    #[tokio::test]
    async fn entity_that_cannot_start_answers_nothing() {
        let store = InMemoryEventStore::new();
        let order_id = StreamId::new("order1");
        order_stream_with_garbage(&store, &order_id).await;

        let sharding = Sharding::default();
        let orders = sharding.register(OrderEntity::new(store)).await;
        let result = orders.send(&order_id, OrderCommand::GetOrderStatus).await;
        assert!(result.is_err());
        sharding.shutdown().await;
    }

    #[tokio::test]
    async fn rejected_decrease_leaves_the_stream_unchanged() {
        let store = InMemoryEventStore::new();
        let product_id = StreamId::new("product1");
        let mut handler = CommandHandler::new(store.clone(), Inventory, product_id.clone());

        let result = handler
            .execute(|stock, _| {
                Err::<(), _>(InventoryError::InsufficientStock {
                    available: *stock,
                    requested: 1,
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(
            store
                .stream_version(INVENTORY_STREAM_TYPE, &product_id)
                .await
                .unwrap(),
            Version::initial()
        );
    }
}

mod delivery {
    use super::*;

    #[tokio::test]
    async fn redelivered_increase_is_applied_once() {
        let store = InMemoryEventStore::new();
        let sharding = Sharding::default();
        let inventory = sharding
            .register(AtMostOnceEntity::new(
                InventoryEntity::new(store.clone()),
                store.clone(),
                InventoryCommand::message_id,
            ))
            .await;
        let product_id = StreamId::new("product1");

        let increase = Envelope::new(Increase { amount: 7 });
        for _ in 0..3 {
            inventory
                .send_discard(&product_id, InventoryCommand::Increase(increase.clone()))
                .await
                .unwrap();
        }

        assert_eq!(current_stock(&inventory, &product_id).await, 7);
        sharding.shutdown().await;
    }

    #[tokio::test]
    async fn every_command_is_logged_before_handling() {
        let store = InMemoryEventStore::new();
        let log = EventStoreDeliveryLog::new(store.clone());
        let sharding = Sharding::default();
        let orders = sharding
            .register(AtLeastOnceEntity::new(
                OrderEntity::new(store.clone()),
                log.clone(),
                OrderCommand::message_id,
            ))
            .await;
        let order_id = StreamId::new("order1");
        let place = Envelope::new(PlaceOrder::new("product1", 2));
        let place_id = place.id.clone();
        orders
            .send_discard(&order_id, OrderCommand::PlaceOrder(place))
            .await
            .unwrap();
        orders
            .send(&order_id, OrderCommand::GetOrderStatus)
            .await
            .unwrap();

        let records = log.records(ORDER_STREAM_TYPE, &order_id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message_id, place_id);
        let logged: serde_json::Value = serde_json::from_slice(&records[0].payload).unwrap();
        assert_eq!(logged["PlaceOrder"]["body"]["amount"], 2);
        sharding.shutdown().await;
    }
}
