use std::collections::{HashMap, HashSet};
use std::future::Future;

use async_trait::async_trait;
use common::{MessageId, StreamId};
use event_store::EventStore;
use runtime::{Entity, EntityError};
use serde::{Deserialize, Serialize};

use crate::behaviour::{DomainEvent, EventSourced};
use crate::command::{CommandHandler, CommandOptions};
use crate::error::DomainError;

/// Stream type of the seen-message journals.
pub const AT_MOST_ONCE_STREAM_TYPE: &str = "AtMostOnce";

/// A message id was delivered to the journal's recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReceived {
    pub message_id: MessageId,
}

impl DomainEvent for MessageReceived {
    fn event_type(&self) -> &'static str {
        "MessageReceived"
    }
}

/// Folds a recipient's journal into the set of seen message ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeenMessages;

impl EventSourced for SeenMessages {
    type Event = MessageReceived;
    type State = HashSet<MessageId>;

    fn stream_type(&self) -> &str {
        AT_MOST_ONCE_STREAM_TYPE
    }

    fn initial_state(&self, _stream_id: &StreamId) -> HashSet<MessageId> {
        HashSet::new()
    }

    fn evolve(&self, state: &mut HashSet<MessageId>, event: &MessageReceived) {
        state.insert(event.message_id.clone());
    }
}

/// Outcome of a guarded delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<T> {
    /// First delivery of the id; the handler ran and returned `T`.
    Handled(T),
    /// The id was seen before; the handler did not run.
    Duplicate,
}

impl<T> Delivery<T> {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Delivery::Duplicate)
    }
}

/// At-most-once guard for one recipient type.
///
/// Each entity id gets its own journal stream `"<recipient_type>@<entity_id>"`
/// under [`AT_MOST_ONCE_STREAM_TYPE`]. Journals are cached after first use.
/// Like every command handler, a journal assumes a single writer: use one
/// guard per entity loop.
pub struct AtMostOnce<S: EventStore> {
    store: S,
    recipient_type: String,
    options: CommandOptions,
    journals: HashMap<StreamId, CommandHandler<S, SeenMessages>>,
}

impl<S: EventStore + Clone> AtMostOnce<S> {
    pub fn new(store: S, recipient_type: impl Into<String>) -> Self {
        Self {
            store,
            recipient_type: recipient_type.into(),
            options: CommandOptions::default(),
            journals: HashMap::new(),
        }
    }

    pub fn with_options(mut self, options: CommandOptions) -> Self {
        self.options = options;
        self
    }

    pub fn recipient_type(&self) -> &str {
        &self.recipient_type
    }

    /// Id of the journal stream guarding `entity_id`.
    pub fn journal_id(&self, entity_id: &StreamId) -> StreamId {
        StreamId::new(format!("{}@{}", self.recipient_type, entity_id))
    }

    /// Records `message_id` for `entity_id`.
    ///
    /// Returns true on the first sighting. Repeated ids are not appended
    /// again, so the journal holds each id once.
    pub async fn mark_received(
        &mut self,
        entity_id: &StreamId,
        message_id: &MessageId,
    ) -> Result<bool, DomainError> {
        let journal_id = self.journal_id(entity_id);
        let journal = self.journals.entry(journal_id.clone()).or_insert_with(|| {
            CommandHandler::new(self.store.clone(), SeenMessages, journal_id)
                .with_options(self.options)
        });

        let outcome = journal
            .execute(|seen, emit| {
                if seen.contains(message_id) {
                    return Ok::<_, DomainError>(false);
                }
                emit.emit(MessageReceived {
                    message_id: message_id.clone(),
                });
                Ok(true)
            })
            .await?;
        Ok(outcome.value)
    }

    /// Runs `handler` unless `message_id` was already received by `entity_id`.
    ///
    /// The id is committed before the handler runs: a handler failure does
    /// not make the message deliverable again.
    pub async fn receive<T, E, Fut>(
        &mut self,
        entity_id: &StreamId,
        message_id: &MessageId,
        handler: Fut,
    ) -> Result<Delivery<T>, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: From<DomainError>,
    {
        if !self.mark_received(entity_id, message_id).await? {
            metrics::counter!("delivery_duplicates_total").increment(1);
            tracing::debug!(
                recipient_type = %self.recipient_type,
                %entity_id,
                %message_id,
                "dropping duplicate delivery"
            );
            return Ok(Delivery::Duplicate);
        }
        handler.await.map(Delivery::Handled)
    }
}

/// Runs an entity's handler at most once per message id.
///
/// Messages for which `message_id` returns `None` (queries carrying a
/// reply handle) always reach the inner entity.
pub struct AtMostOnceEntity<E: Entity, S> {
    inner: E,
    store: S,
    options: CommandOptions,
    message_id: fn(&E::Message) -> Option<MessageId>,
}

impl<E: Entity, S> AtMostOnceEntity<E, S> {
    pub fn new(inner: E, store: S, message_id: fn(&E::Message) -> Option<MessageId>) -> Self {
        Self {
            inner,
            store,
            options: CommandOptions::default(),
            message_id,
        }
    }

    pub fn with_options(mut self, options: CommandOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl<E, S> Entity for AtMostOnceEntity<E, S>
where
    E: Entity,
    S: EventStore + Clone + 'static,
{
    type Message = E::Message;
    type State = (E::State, AtMostOnce<S>);

    fn entity_type(&self) -> &str {
        self.inner.entity_type()
    }

    async fn start(&self, entity_id: &StreamId) -> Result<Self::State, EntityError> {
        let inner = self.inner.start(entity_id).await?;
        let guard = AtMostOnce::new(self.store.clone(), self.inner.entity_type())
            .with_options(self.options);
        Ok((inner, guard))
    }

    async fn receive(
        &self,
        entity_id: &StreamId,
        state: &mut Self::State,
        message: Self::Message,
    ) -> Result<(), EntityError> {
        let (inner_state, guard) = state;
        let Some(message_id) = (self.message_id)(&message) else {
            return self.inner.receive(entity_id, inner_state, message).await;
        };
        guard
            .receive(
                entity_id,
                &message_id,
                self.inner.receive(entity_id, inner_state, message),
            )
            .await?;
        Ok(())
    }

    async fn stop(&self, entity_id: &StreamId, state: Self::State) {
        self.inner.stop(entity_id, state.0).await;
    }
}
