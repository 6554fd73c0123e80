use async_trait::async_trait;
use common::{MessageId, StreamId};
use domain::{CommandHandler, CommandOptions, DomainError, EventSourced};
use event_store::EventStore;
use runtime::{Entity, EntityError, SendDiscard};

use super::commands::{Fanout, SagaManagerCommand, decide};
use super::state::{SagaManagerBehaviour, SagaMessage};

/// Singleton entity tracking the running sagas of one saga type and
/// broadcasting events to them until each acknowledges.
///
/// Deliveries run on their own tasks after the command commits, so a slow
/// or unreachable saga never holds up the manager's mailbox.
pub struct SagaManagerEntity<S, M, Sd> {
    store: S,
    saga_type: String,
    behaviour: SagaManagerBehaviour<M>,
    make_id: fn(&M) -> MessageId,
    sagas: Sd,
    options: CommandOptions,
}

impl<S, M, Sd> SagaManagerEntity<S, M, Sd>
where
    M: SagaMessage,
    Sd: SendDiscard<M> + Clone + 'static,
{
    /// `make_id` gives every broadcast event its acknowledgement id; `sagas`
    /// delivers to the saga instances.
    pub fn new(store: S, saga_type: impl Into<String>, make_id: fn(&M) -> MessageId, sagas: Sd) -> Self {
        let saga_type = saga_type.into();
        Self {
            store,
            behaviour: SagaManagerBehaviour::new(&saga_type),
            saga_type,
            make_id,
            sagas,
            options: CommandOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CommandOptions) -> Self {
        self.options = options;
        self
    }

    fn fan_out(&self, fanout: Fanout<M>) {
        let Fanout {
            event_id,
            event,
            targets,
        } = fanout;
        for saga_id in targets {
            let sagas = self.sagas.clone();
            let event = event.clone();
            let event_id = event_id.clone();
            let saga_type = self.saga_type.clone();
            tokio::spawn(async move {
                match sagas.send_discard(&saga_id, event).await {
                    Ok(()) => {
                        metrics::counter!("saga_manager_deliveries_total").increment(1);
                        tracing::debug!(%saga_type, %saga_id, %event_id, "event delivered");
                    }
                    Err(error) => {
                        metrics::counter!("saga_manager_delivery_failures_total").increment(1);
                        tracing::warn!(%saga_type, %saga_id, %event_id, %error, "event delivery failed");
                    }
                }
            });
        }
    }
}

#[async_trait]
impl<S, M, Sd> Entity for SagaManagerEntity<S, M, Sd>
where
    S: EventStore + Clone + 'static,
    M: SagaMessage,
    Sd: SendDiscard<M> + Clone + 'static,
{
    type Message = SagaManagerCommand<M>;
    type State = CommandHandler<S, SagaManagerBehaviour<M>>;

    fn entity_type(&self) -> &str {
        self.behaviour.stream_type()
    }

    async fn start(&self, entity_id: &StreamId) -> Result<Self::State, EntityError> {
        let handler = CommandHandler::load_with_options(
            self.store.clone(),
            self.behaviour.clone(),
            entity_id.clone(),
            self.options,
        )
        .await?;
        tracing::info!(
            saga_type = %self.saga_type,
            running = handler.state().running_ids().len(),
            pending = handler.state().pending_event_ids().count(),
            "saga manager loaded"
        );
        Ok(handler)
    }

    async fn receive(
        &self,
        _entity_id: &StreamId,
        handler: &mut Self::State,
        command: SagaManagerCommand<M>,
    ) -> Result<(), EntityError> {
        let make_id = self.make_id;
        let outcome = handler
            .execute(|_, emit| Ok::<_, DomainError>(decide(&command, make_id, emit)))
            .await?;

        match outcome.value {
            Some(fanout) => self.fan_out(fanout),
            None => {
                if let SagaManagerCommand::BroadcastEvent { event } = &command {
                    tracing::info!(
                        saga_type = %self.saga_type,
                        event_id = %make_id(event),
                        "no running sagas, broadcast dropped"
                    );
                }
            }
        }
        Ok(())
    }
}
