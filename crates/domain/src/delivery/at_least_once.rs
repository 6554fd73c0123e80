use std::future::Future;

use async_trait::async_trait;
use common::{MessageId, StreamId};
use event_store::{EventStore, Version, codec};
use runtime::{Entity, EntityError};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Stream type of the delivery logs.
pub const AT_LEAST_ONCE_STREAM_TYPE: &str = "AtLeastOnce";

const PERSIST_ATTEMPTS: u32 = 5;

/// A message as it was received, before any handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub entity_type: String,
    pub entity_id: StreamId,
    pub message_id: MessageId,
    /// The encoded message.
    pub payload: Vec<u8>,
}

/// Durable storage for received messages.
#[async_trait]
pub trait DeliveryLog: Send + Sync {
    /// Persists a record and returns its position in the entity's log.
    async fn persist_message(&self, record: DeliveryRecord) -> Result<Version, DomainError>;
}

/// [`DeliveryLog`] keeping one stream per entity in the event store.
///
/// Records of `Inventory/product1` live on stream
/// `AtLeastOnce/Inventory@product1`.
#[derive(Debug, Clone)]
pub struct EventStoreDeliveryLog<S> {
    store: S,
}

impl<S: EventStore> EventStoreDeliveryLog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn log_id(entity_type: &str, entity_id: &StreamId) -> StreamId {
        StreamId::new(format!("{entity_type}@{entity_id}"))
    }

    /// Every record logged for an entity, oldest first.
    pub async fn records(
        &self,
        entity_type: &str,
        entity_id: &StreamId,
    ) -> Result<Vec<DeliveryRecord>, DomainError> {
        let log_id = Self::log_id(entity_type, entity_id);
        let events = self
            .store
            .read_stream(AT_LEAST_ONCE_STREAM_TYPE, &log_id, Version::initial())
            .await?;

        events
            .iter()
            .map(|event| {
                event.decode().map_err(|source| DomainError::Decode {
                    stream_type: AT_LEAST_ONCE_STREAM_TYPE.to_string(),
                    stream_id: log_id.clone(),
                    version: event.version,
                    source,
                })
            })
            .collect()
    }
}

#[async_trait]
impl<S: EventStore> DeliveryLog for EventStoreDeliveryLog<S> {
    async fn persist_message(&self, record: DeliveryRecord) -> Result<Version, DomainError> {
        let log_id = Self::log_id(&record.entity_type, &record.entity_id);
        let body = codec::encode(&record)?;

        // Senders on several tasks may log for the same entity, so the
        // expected version is re-read after every conflict.
        let mut attempt = 0;
        loop {
            attempt += 1;
            let expected = self
                .store
                .stream_version(AT_LEAST_ONCE_STREAM_TYPE, &log_id)
                .await?;
            match self
                .store
                .persist_events(AT_LEAST_ONCE_STREAM_TYPE, &log_id, expected, vec![body.clone()])
                .await
            {
                Ok(version) => return Ok(version),
                Err(error) if error.is_conflict() && attempt < PERSIST_ATTEMPTS => {
                    tracing::warn!(stream_id = %log_id, attempt, %error, "delivery log append raced");
                }
                Err(error) if error.is_conflict() => {
                    return Err(DomainError::ConflictRetriesExhausted {
                        stream_type: AT_LEAST_ONCE_STREAM_TYPE.to_string(),
                        stream_id: log_id,
                        attempts: attempt,
                    });
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

/// Records every message of one entity type before it is handled.
///
/// Does not suppress duplicates; pair with
/// [`AtMostOnce`](super::AtMostOnce) for that.
#[derive(Debug, Clone)]
pub struct AtLeastOnce<L> {
    log: L,
    entity_type: String,
}

impl<L: DeliveryLog> AtLeastOnce<L> {
    pub fn new(log: L, entity_type: impl Into<String>) -> Self {
        Self {
            log,
            entity_type: entity_type.into(),
        }
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Persists `message`, then hands it to `next`.
    ///
    /// If the record cannot be persisted `next` is not called.
    pub async fn receive<M, T, E, F, Fut>(
        &self,
        entity_id: &StreamId,
        message_id: MessageId,
        message: M,
        next: F,
    ) -> Result<T, E>
    where
        M: Serialize,
        F: FnOnce(M) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<DomainError>,
    {
        let payload = codec::encode(&message).map_err(DomainError::from)?;
        let position = self
            .log
            .persist_message(DeliveryRecord {
                entity_type: self.entity_type.clone(),
                entity_id: entity_id.clone(),
                message_id,
                payload,
            })
            .await?;
        metrics::counter!("delivery_messages_logged_total").increment(1);
        tracing::trace!(entity_type = %self.entity_type, %entity_id, %position, "message logged");

        next(message).await
    }
}

/// Logs every message of an entity before its handler runs.
///
/// Messages for which `message_id` returns `None` (queries carrying a
/// reply handle) are handed to the inner entity without being logged.
pub struct AtLeastOnceEntity<E: Entity, L> {
    inner: E,
    log: AtLeastOnce<L>,
    message_id: fn(&E::Message) -> Option<MessageId>,
}

impl<E: Entity, L: DeliveryLog> AtLeastOnceEntity<E, L> {
    pub fn new(inner: E, log: L, message_id: fn(&E::Message) -> Option<MessageId>) -> Self {
        let log = AtLeastOnce::new(log, inner.entity_type());
        Self {
            inner,
            log,
            message_id,
        }
    }
}

#[async_trait]
impl<E, L> Entity for AtLeastOnceEntity<E, L>
where
    E: Entity,
    E::Message: Serialize,
    L: DeliveryLog + 'static,
{
    type Message = E::Message;
    type State = E::State;

    fn entity_type(&self) -> &str {
        self.inner.entity_type()
    }

    async fn start(&self, entity_id: &StreamId) -> Result<Self::State, EntityError> {
        self.inner.start(entity_id).await
    }

    async fn receive(
        &self,
        entity_id: &StreamId,
        state: &mut Self::State,
        message: Self::Message,
    ) -> Result<(), EntityError> {
        let Some(message_id) = (self.message_id)(&message) else {
            return self.inner.receive(entity_id, state, message).await;
        };
        self.log
            .receive(entity_id, message_id, message, |message| {
                self.inner.receive(entity_id, state, message)
            })
            .await
    }

    async fn stop(&self, entity_id: &StreamId, state: Self::State) {
        self.inner.stop(entity_id, state).await;
    }
}
