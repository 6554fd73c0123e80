//! Typed view over the merged journal.

use common::StreamId;
use domain::{DecodePolicy, DomainError};
use event_store::{
    CodecError, EventStore, EventStoreExt, JournalFilter, JournalOptions, PersistedEvent,
    Sequence, Version,
};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SagaError};

/// A journal event with its payload decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEvent<E> {
    pub sequence: Sequence,
    pub stream_type: String,
    pub stream_id: StreamId,
    pub version: Version,
    pub payload: E,
}

impl<E: DeserializeOwned> JournalEvent<E> {
    pub fn decode(event: &PersistedEvent) -> std::result::Result<Self, CodecError> {
        Ok(Self {
            sequence: event.sequence,
            stream_type: event.stream_type.clone(),
            stream_id: event.stream_id.clone(),
            version: event.version,
            payload: event.decode()?,
        })
    }
}

/// Follows the journal after `from`, decoding every payload as `E`.
///
/// Under [`DecodePolicy::Skip`] undecodable events are logged and dropped;
/// under [`DecodePolicy::Fail`] they surface as [`DomainError::Decode`].
/// Store failures surface as items too and the stream keeps following.
pub fn decoded_journal<S, E>(
    store: &S,
    filter: JournalFilter,
    from: Sequence,
    options: JournalOptions,
    decode_policy: DecodePolicy,
) -> BoxStream<'static, Result<JournalEvent<E>>>
where
    S: EventStore + Clone + 'static,
    E: DeserializeOwned + Send + 'static,
{
    store
        .read_journal(filter, from, options)
        .filter_map(move |item| async move {
            let event = match item {
                Ok(event) => event,
                Err(error) => return Some(Err(SagaError::from(error))),
            };
            match JournalEvent::decode(&event) {
                Ok(decoded) => Some(Ok(decoded)),
                Err(source) => match decode_policy {
                    DecodePolicy::Skip => {
                        tracing::warn!(
                            stream_type = %event.stream_type,
                            stream_id = %event.stream_id,
                            sequence = %event.sequence,
                            error = %source,
                            "skipping undecodable journal event"
                        );
                        None
                    }
                    DecodePolicy::Fail => Some(Err(DomainError::Decode {
                        stream_type: event.stream_type,
                        stream_id: event.stream_id,
                        version: event.version,
                        source,
                    }
                    .into())),
                },
            }
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use event_store::InMemoryEventStore;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Shipped {
        product_id: String,
    }

    async fn seed(store: &InMemoryEventStore) {
        let good = serde_json::to_vec(&Shipped {
            product_id: "product1".to_string(),
        })
        .unwrap();
        store
            .persist_events(
                "Order",
                &StreamId::new("order1"),
                Version::initial(),
                vec![good.clone(), b"garbage".to_vec(), good],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn skip_policy_drops_undecodable_events() {
        let store = InMemoryEventStore::new();
        seed(&store).await;

        let mut journal = decoded_journal::<_, Shipped>(
            &store,
            JournalFilter::stream_type("Order"),
            Sequence::start(),
            JournalOptions::default(),
            DecodePolicy::Skip,
        );

        let first = journal.next().await.unwrap().unwrap();
        let second = journal.next().await.unwrap().unwrap();
        assert_eq!(first.sequence, Sequence::new(1));
        assert_eq!(second.sequence, Sequence::new(3));
        assert_eq!(second.payload.product_id, "product1");
    }

    #[tokio::test]
    async fn fail_policy_surfaces_decode_errors() {
        let store = InMemoryEventStore::new();
        seed(&store).await;

        let mut journal = decoded_journal::<_, Shipped>(
            &store,
            JournalFilter::all(),
            Sequence::new(1),
            JournalOptions::default(),
            DecodePolicy::Fail,
        );

        match journal.next().await.unwrap() {
            Err(SagaError::Domain(DomainError::Decode { version, .. })) => {
                assert_eq!(version, Version::new(2))
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }
}
