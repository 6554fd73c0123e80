use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use tokio::sync::watch;

use crate::journal::{self, JournalFilter, JournalOptions};
use crate::{EventStoreError, PersistedEvent, Result, Sequence, StreamId, Version};

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<PersistedEvent>> + Send>>;

/// Core trait for event store implementations.
///
/// An event store keeps one append-only stream per `(stream_type, stream_id)`
/// and a global journal that orders every event by [`Sequence`].
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to a stream.
    ///
    /// The bodies receive versions `expected_version + 1 ..= expected_version + n`
    /// atomically: either all are written or none are. Fails with
    /// `VersionConflict` if the stream is no longer at `expected_version`;
    /// of two writers racing on the same version exactly one succeeds.
    ///
    /// Returns the new version of the stream.
    async fn persist_events(
        &self,
        stream_type: &str,
        stream_id: &StreamId,
        expected_version: Version,
        bodies: Vec<Vec<u8>>,
    ) -> Result<Version>;

    /// Retrieves the events of a stream with a version greater than `from_version`.
    ///
    /// Events are returned in version order and the result ends at the
    /// current tail of the stream.
    async fn read_stream(
        &self,
        stream_type: &str,
        stream_id: &StreamId,
        from_version: Version,
    ) -> Result<Vec<PersistedEvent>>;

    /// Gets the current version of a stream, `Version::initial()` when empty.
    async fn stream_version(&self, stream_type: &str, stream_id: &StreamId) -> Result<Version>;

    /// Retrieves up to `limit` journal events positioned after `after`,
    /// in sequence order.
    async fn read_journal_page(
        &self,
        filter: &JournalFilter,
        after: Sequence,
        limit: usize,
    ) -> Result<Vec<PersistedEvent>>;

    /// Subscribes to change notifications.
    ///
    /// The value is the last sequence this process knows to be committed.
    /// Writers outside the process are not announced; journal readers pick
    /// them up on their poll interval.
    fn changes(&self) -> watch::Receiver<Sequence>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends a single event to a stream.
    async fn persist_event(
        &self,
        stream_type: &str,
        stream_id: &StreamId,
        expected_version: Version,
        body: Vec<u8>,
    ) -> Result<Version> {
        self.persist_events(stream_type, stream_id, expected_version, vec![body])
            .await
    }

    /// Checks if a stream has any events.
    async fn stream_exists(&self, stream_type: &str, stream_id: &StreamId) -> Result<bool> {
        Ok(self.stream_version(stream_type, stream_id).await? > Version::initial())
    }

    /// Reads the journal from `from` (exclusive) and keeps following it.
    ///
    /// The returned stream does not terminate at the current tail: once caught
    /// up it waits for a change notification or the poll interval and queries
    /// again from the last event it yielded.
    fn read_journal(
        &self,
        filter: JournalFilter,
        from: Sequence,
        options: JournalOptions,
    ) -> EventStream
    where
        Self: Clone + Sized + 'static,
    {
        journal::subscribe(self.clone(), filter, from, options)
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Validates an append request before it reaches storage.
pub fn validate_append(stream_type: &str, stream_id: &StreamId, expected_version: Version) -> Result<()> {
    if stream_type.is_empty() {
        return Err(EventStoreError::InvalidAppend(
            "stream type must not be empty".to_string(),
        ));
    }
    if stream_id.as_str().is_empty() {
        return Err(EventStoreError::InvalidAppend(
            "stream id must not be empty".to_string(),
        ));
    }
    if expected_version < Version::initial() {
        return Err(EventStoreError::InvalidAppend(format!(
            "expected version must not be negative, got {expected_version}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_identifiers() {
        assert!(validate_append("", &StreamId::new("a"), Version::initial()).is_err());
        assert!(validate_append("Order", &StreamId::new(""), Version::initial()).is_err());
    }

    #[test]
    fn validate_rejects_negative_versions() {
        let result = validate_append("Order", &StreamId::new("order1"), Version::new(-1));
        assert!(matches!(result, Err(EventStoreError::InvalidAppend(_))));
    }

    #[test]
    fn validate_accepts_well_formed_requests() {
        assert!(validate_append("Order", &StreamId::new("order1"), Version::new(4)).is_ok());
    }
}
