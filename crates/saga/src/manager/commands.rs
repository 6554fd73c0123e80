//! Saga manager commands and the decision logic behind them.

use std::collections::BTreeSet;

use common::{MessageId, StreamId};
use domain::Emitter;

use super::state::{SagaManagerBehaviour, SagaManagerEvent, SagaMessage};

/// Messages accepted by a saga manager.
#[derive(Debug, Clone, PartialEq)]
pub enum SagaManagerCommand<M> {
    StartSaga { saga_id: StreamId },
    CompleteSaga { saga_id: StreamId },
    AckReception { saga_id: StreamId, event_id: MessageId },
    BroadcastEvent { event: M },
}

/// Deliveries a command asks for once it is committed.
#[derive(Debug, Clone, PartialEq)]
pub struct Fanout<M> {
    pub event_id: MessageId,
    pub event: M,
    pub targets: BTreeSet<StreamId>,
}

/// Emits the events for `command` and returns the deliveries it triggers.
///
/// Repeated starts and completions emit nothing. Acks for a broadcast the
/// saga does not owe emit nothing but still pick the saga's next pending
/// broadcast for redelivery.
pub(crate) fn decide<M: SagaMessage>(
    command: &SagaManagerCommand<M>,
    make_id: fn(&M) -> MessageId,
    emit: &mut Emitter<'_, SagaManagerBehaviour<M>>,
) -> Option<Fanout<M>> {
    match command {
        SagaManagerCommand::StartSaga { saga_id } => {
            if !emit.state().is_running(saga_id) {
                emit.emit(SagaManagerEvent::SagaStarted {
                    saga_id: saga_id.clone(),
                });
            }
            None
        }
        SagaManagerCommand::CompleteSaga { saga_id } => {
            if emit.state().is_running(saga_id) {
                emit.emit(SagaManagerEvent::SagaCompleted {
                    saga_id: saga_id.clone(),
                });
            }
            None
        }
        SagaManagerCommand::AckReception { saga_id, event_id } => {
            let owed = emit
                .state()
                .pending_for(event_id)
                .is_some_and(|sagas| sagas.contains(saga_id));
            if owed {
                emit.emit(SagaManagerEvent::AckReceived {
                    saga_id: saga_id.clone(),
                    event_id: event_id.clone(),
                });
            }
            emit.state()
                .next_pending_for(saga_id, event_id)
                .map(|(next_id, event)| Fanout {
                    event_id: next_id.clone(),
                    event: event.clone(),
                    targets: BTreeSet::from([saga_id.clone()]),
                })
        }
        SagaManagerCommand::BroadcastEvent { event } => {
            let event_id = make_id(event);
            if let Some(outstanding) = emit.state().pending_for(&event_id) {
                return Some(Fanout {
                    event_id,
                    event: event.clone(),
                    targets: outstanding.clone(),
                });
            }

            let targets = emit.state().running_ids().clone();
            if targets.is_empty() {
                return None;
            }
            emit.emit(SagaManagerEvent::SendStarted {
                event_id: event_id.clone(),
                event: event.clone(),
            });
            Some(Fanout {
                event_id,
                event: event.clone(),
                targets,
            })
        }
    }
}
