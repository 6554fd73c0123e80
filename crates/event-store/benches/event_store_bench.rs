use criterion::{Criterion, criterion_group, criterion_main};
use event_store::{
    EventStore, EventStoreExt, InMemoryEventStore, JournalFilter, Sequence, StreamId, Version,
};

fn make_body(n: i64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "type": "ProductShipped",
        "data": { "product_id": "product1", "amount": n }
    }))
    .unwrap()
}

async fn populated_store(streams: usize, per_stream: i64) -> InMemoryEventStore {
    let store = InMemoryEventStore::new();
    for s in 0..streams {
        let id = StreamId::new(format!("order{s}"));
        let bodies = (1..=per_stream).map(make_body).collect();
        store
            .persist_events("Order", &id, Version::initial(), bodies)
            .await
            .unwrap();
    }
    store
}

fn bench_persist_single_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/persist_single_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                store
                    .persist_event("Order", &StreamId::new("order1"), Version::initial(), make_body(1))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_persist_batch_10(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/persist_batch_10", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let bodies = (1..=10).map(make_body).collect();
                store
                    .persist_events("Order", &StreamId::new("order1"), Version::initial(), bodies)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_read_stream(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = rt.block_on(populated_store(1, 100));
    let id = StreamId::new("order0");

    c.bench_function("event_store/read_stream_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.read_stream("Order", &id, Version::initial()).await.unwrap();
            });
        });
    });

    c.bench_function("event_store/read_stream_from_version_50", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.read_stream("Order", &id, Version::new(50)).await.unwrap();
            });
        });
    });
}

fn bench_read_journal_pages(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = rt.block_on(populated_store(10, 100));

    c.bench_function("event_store/journal_1000_events_in_pages", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut cursor = Sequence::start();
                let mut count = 0;
                loop {
                    let page = store
                        .read_journal_page(&JournalFilter::all(), cursor, 256)
                        .await
                        .unwrap();
                    let Some(last) = page.last() else { break };
                    cursor = last.sequence;
                    count += page.len();
                }
                assert_eq!(count, 1000);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_persist_single_event,
    bench_persist_batch_10,
    bench_read_stream,
    bench_read_journal_pages,
);
criterion_main!(benches);
