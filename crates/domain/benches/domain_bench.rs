use common::{Envelope, StreamId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::inventory::{Increase, StockChanged};
use domain::order::OrderPlacedData;
use domain::{CommandHandler, DomainError, Inventory, InventoryEvent, Order, OrderEvent};
use event_store::{EventStore, InMemoryEventStore, Version, codec};

async fn increment(handler: &mut CommandHandler<InMemoryEventStore, Inventory>) {
    let command = Envelope::new(Increase { amount: 1 });
    handler
        .execute(|_, emit| {
            emit.emit(command.caused(InventoryEvent::Incremented(StockChanged { amount: 1 })));
            Ok::<_, DomainError>(())
        })
        .await
        .unwrap();
}

fn bench_execute_command(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut handler = CommandHandler::new(
        InMemoryEventStore::new(),
        Inventory,
        StreamId::new("product1"),
    );

    c.bench_function("domain/execute_command", |b| {
        b.iter(|| rt.block_on(increment(&mut handler)));
    });
}

fn bench_replay_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let order_id = StreamId::new("order1");

    let bodies: Vec<_> = (0..100)
        .map(|n| {
            codec::encode(&Envelope::new(OrderEvent::OrderPlaced(OrderPlacedData {
                order_id: order_id.clone(),
                product_id: StreamId::new(format!("product{}", n % 10)),
                amount: 1,
            })))
            .unwrap()
        })
        .collect();
    rt.block_on(store.persist_events("Order", &order_id, Version::initial(), bodies))
        .unwrap();

    c.bench_function("domain/replay_100_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                CommandHandler::load(store.clone(), Order, order_id.clone())
                    .await
                    .unwrap()
            })
        });
    });
}

criterion_group!(benches, bench_execute_command, bench_replay_order);
criterion_main!(benches);
