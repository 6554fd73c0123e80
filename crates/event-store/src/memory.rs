use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, watch};

use crate::journal::JournalFilter;
use crate::{
    EventStoreError, PersistedEvent, Result, Sequence, StreamId, Version,
    store::{EventStore, validate_append},
};

/// In-memory event store implementation for testing.
///
/// This implementation stores all events in memory and provides
/// the same interface as the PostgreSQL implementation.
#[derive(Clone)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<PersistedEvent>>>,
    notifier: Arc<watch::Sender<Sequence>>,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        let (notifier, _) = watch::channel(Sequence::start());
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            notifier: Arc::new(notifier),
        }
    }
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Returns every stored event in journal order.
    pub async fn all_events(&self) -> Vec<PersistedEvent> {
        self.events.read().await.clone()
    }

    fn current_version(events: &[PersistedEvent], stream_type: &str, stream_id: &StreamId) -> Version {
        events
            .iter()
            .filter(|e| e.stream_type == stream_type && &e.stream_id == stream_id)
            .map(|e| e.version)
            .max()
            .unwrap_or(Version::initial())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn persist_events(
        &self,
        stream_type: &str,
        stream_id: &StreamId,
        expected_version: Version,
        bodies: Vec<Vec<u8>>,
    ) -> Result<Version> {
        validate_append(stream_type, stream_id, expected_version)?;
        if bodies.is_empty() {
            return Ok(expected_version);
        }

        // The write lock spans check and append, so racing writers serialize here.
        let mut store = self.events.write().await;

        let current_version = Self::current_version(&store, stream_type, stream_id);
        if current_version != expected_version {
            metrics::counter!("event_store_version_conflicts_total").increment(1);
            return Err(EventStoreError::VersionConflict {
                stream_type: stream_type.to_string(),
                stream_id: stream_id.clone(),
                expected: expected_version,
                actual: current_version,
            });
        }

        let mut sequence = store.last().map(|e| e.sequence).unwrap_or_default();
        let created_at = Utc::now();
        let count = bodies.len();
        for (idx, body) in bodies.into_iter().enumerate() {
            sequence = sequence.next();
            store.push(PersistedEvent {
                stream_type: stream_type.to_string(),
                stream_id: stream_id.clone(),
                version: expected_version.advance(idx + 1),
                sequence,
                created_at,
                body,
            });
        }
        drop(store);

        metrics::counter!("event_store_events_appended_total").increment(count as u64);
        self.notifier.send_replace(sequence);

        Ok(expected_version.advance(count))
    }

    async fn read_stream(
        &self,
        stream_type: &str,
        stream_id: &StreamId,
        from_version: Version,
    ) -> Result<Vec<PersistedEvent>> {
        let store = self.events.read().await;
        let mut events: Vec<_> = store
            .iter()
            .filter(|e| {
                e.stream_type == stream_type && &e.stream_id == stream_id && e.version > from_version
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    async fn stream_version(&self, stream_type: &str, stream_id: &StreamId) -> Result<Version> {
        let store = self.events.read().await;
        Ok(Self::current_version(&store, stream_type, stream_id))
    }

    async fn read_journal_page(
        &self,
        filter: &JournalFilter,
        after: Sequence,
        limit: usize,
    ) -> Result<Vec<PersistedEvent>> {
        let store = self.events.read().await;
        // Events are pushed in sequence order, so the tail starts right after `after`.
        let start = store.partition_point(|e| e.sequence <= after);
        Ok(store[start..]
            .iter()
            .filter(|e| filter.matches(&e.stream_type))
            .take(limit)
            .cloned()
            .collect())
    }

    fn changes(&self) -> watch::Receiver<Sequence> {
        self.notifier.subscribe()
    }
}
