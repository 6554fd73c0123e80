//! Saga manager events, state and its fold.

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;

use common::{MessageId, StreamId};
use domain::{DomainEvent, EventSourced};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Payload a saga manager can journal and broadcast.
pub trait SagaMessage: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> SagaMessage for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Events of a saga manager stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", bound = "M: SagaMessage")]
pub enum SagaManagerEvent<M> {
    SagaStarted { saga_id: StreamId },
    SagaCompleted { saga_id: StreamId },
    /// A broadcast started; the running sagas at this point must ack it.
    SendStarted { event_id: MessageId, event: M },
    AckReceived { saga_id: StreamId, event_id: MessageId },
}

impl<M: SagaMessage> DomainEvent for SagaManagerEvent<M> {
    fn event_type(&self) -> &'static str {
        match self {
            SagaManagerEvent::SagaStarted { .. } => "SagaStarted",
            SagaManagerEvent::SagaCompleted { .. } => "SagaCompleted",
            SagaManagerEvent::SendStarted { .. } => "SendStarted",
            SagaManagerEvent::AckReceived { .. } => "AckReceived",
        }
    }
}

/// Running sagas and the broadcasts they still have to acknowledge.
#[derive(Debug, Clone, PartialEq)]
pub struct SagaManagerState<M> {
    running_ids: BTreeSet<StreamId>,
    pending: BTreeMap<MessageId, BTreeSet<StreamId>>,
    events: BTreeMap<MessageId, M>,
}

impl<M> Default for SagaManagerState<M> {
    fn default() -> Self {
        Self {
            running_ids: BTreeSet::new(),
            pending: BTreeMap::new(),
            events: BTreeMap::new(),
        }
    }
}

impl<M> SagaManagerState<M> {
    pub fn running_ids(&self) -> &BTreeSet<StreamId> {
        &self.running_ids
    }

    pub fn is_running(&self, saga_id: &StreamId) -> bool {
        self.running_ids.contains(saga_id)
    }

    /// Sagas that have not acknowledged `event_id` yet.
    pub fn pending_for(&self, event_id: &MessageId) -> Option<&BTreeSet<StreamId>> {
        self.pending.get(event_id)
    }

    pub fn pending_event_ids(&self) -> impl Iterator<Item = &MessageId> {
        self.pending.keys()
    }

    pub fn event(&self, event_id: &MessageId) -> Option<&M> {
        self.events.get(event_id)
    }

    /// First pending broadcast, other than `exclude`, that `saga_id` still owes an ack for.
    pub fn next_pending_for(
        &self,
        saga_id: &StreamId,
        exclude: &MessageId,
    ) -> Option<(&MessageId, &M)> {
        self.pending
            .iter()
            .filter(|(event_id, sagas)| *event_id != exclude && sagas.contains(saga_id))
            .find_map(|(event_id, _)| self.events.get(event_id).map(|event| (event_id, event)))
    }

    fn acknowledge(&mut self, saga_id: &StreamId, event_id: &MessageId) {
        if let Some(sagas) = self.pending.get_mut(event_id) {
            sagas.remove(saga_id);
            if sagas.is_empty() {
                self.pending.remove(event_id);
                self.events.remove(event_id);
            }
        }
    }
}

/// Event-sourced behaviour of the saga manager of one saga type.
pub struct SagaManagerBehaviour<M> {
    stream_type: String,
    _message: PhantomData<fn() -> M>,
}

impl<M> SagaManagerBehaviour<M> {
    pub fn new(saga_type: &str) -> Self {
        Self {
            stream_type: manager_type(saga_type),
            _message: PhantomData,
        }
    }
}

impl<M> Clone for SagaManagerBehaviour<M> {
    fn clone(&self) -> Self {
        Self {
            stream_type: self.stream_type.clone(),
            _message: PhantomData,
        }
    }
}

/// Entity and stream type of the manager of `saga_type`.
pub fn manager_type(saga_type: &str) -> String {
    format!("SagaManager({saga_type})")
}

impl<M: SagaMessage> EventSourced for SagaManagerBehaviour<M> {
    type Event = SagaManagerEvent<M>;
    type State = SagaManagerState<M>;

    fn stream_type(&self) -> &str {
        &self.stream_type
    }

    fn initial_state(&self, _stream_id: &StreamId) -> SagaManagerState<M> {
        SagaManagerState::default()
    }

    fn evolve(&self, state: &mut SagaManagerState<M>, event: &SagaManagerEvent<M>) {
        match event {
            SagaManagerEvent::SagaStarted { saga_id } => {
                state.running_ids.insert(saga_id.clone());
            }
            SagaManagerEvent::SagaCompleted { saga_id } => {
                state.running_ids.remove(saga_id);
                // Completion acknowledges everything still outstanding.
                let owed: Vec<MessageId> = state
                    .pending
                    .iter()
                    .filter(|(_, sagas)| sagas.contains(saga_id))
                    .map(|(event_id, _)| event_id.clone())
                    .collect();
                for event_id in owed {
                    state.acknowledge(saga_id, &event_id);
                }
            }
            SagaManagerEvent::SendStarted { event_id, event } => {
                if !state.pending.contains_key(event_id) && !state.running_ids.is_empty() {
                    state
                        .pending
                        .insert(event_id.clone(), state.running_ids.clone());
                    state.events.insert(event_id.clone(), event.clone());
                }
            }
            SagaManagerEvent::AckReceived { saga_id, event_id } => {
                state.acknowledge(saga_id, event_id);
            }
        }
    }
}
