use common::{MessageId, StreamId};
use futures_util::{Stream, StreamExt};
use runtime::{Entity, Messenger, Sharding};

use super::commands::SagaManagerCommand;
use super::entity::SagaManagerEntity;
use super::state::SagaMessage;
use crate::error::Result;

/// Entity id of the saga manager singleton.
pub const MANAGER_ID: &str = "manager";

/// Handle for talking to the saga manager of one saga type.
pub struct SagaManagerClient<M> {
    manager: Messenger<SagaManagerCommand<M>>,
    manager_id: StreamId,
}

impl<M> Clone for SagaManagerClient<M> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            manager_id: self.manager_id.clone(),
        }
    }
}

impl<M: SagaMessage> SagaManagerClient<M> {
    pub fn new(manager: Messenger<SagaManagerCommand<M>>) -> Self {
        Self {
            manager,
            manager_id: StreamId::new(MANAGER_ID),
        }
    }

    /// Registers `entity` with `sharding` and returns a client for it.
    pub async fn register<S, Sd>(sharding: &Sharding, entity: SagaManagerEntity<S, M, Sd>) -> Self
    where
        SagaManagerEntity<S, M, Sd>: Entity<Message = SagaManagerCommand<M>>,
    {
        Self::new(sharding.register(entity).await)
    }

    async fn tell(&self, command: SagaManagerCommand<M>) -> Result<()> {
        self.manager.send_discard(&self.manager_id, command).await?;
        Ok(())
    }

    pub async fn start_saga(&self, saga_id: impl Into<StreamId>) -> Result<()> {
        self.tell(SagaManagerCommand::StartSaga {
            saga_id: saga_id.into(),
        })
        .await
    }

    pub async fn complete_saga(&self, saga_id: impl Into<StreamId>) -> Result<()> {
        self.tell(SagaManagerCommand::CompleteSaga {
            saga_id: saga_id.into(),
        })
        .await
    }

    pub async fn ack_reception(
        &self,
        saga_id: impl Into<StreamId>,
        event_id: impl Into<MessageId>,
    ) -> Result<()> {
        self.tell(SagaManagerCommand::AckReception {
            saga_id: saga_id.into(),
            event_id: event_id.into(),
        })
        .await
    }

    pub async fn broadcast_event(&self, event: M) -> Result<()> {
        self.tell(SagaManagerCommand::BroadcastEvent { event }).await
    }

    /// Broadcasts every event of `producer` until it ends.
    ///
    /// Meant to run once per process as the manager's feeding task. Stops at
    /// the first event the manager cannot accept and returns how many were
    /// handed over.
    #[tracing::instrument(skip_all, fields(entity_type = self.manager.entity_type()))]
    pub async fn broadcast_all<St>(&self, producer: St) -> Result<usize>
    where
        St: Stream<Item = M> + Send,
    {
        let mut producer = std::pin::pin!(producer);
        let mut count = 0;
        while let Some(event) = producer.next().await {
            if let Err(error) = self.broadcast_event(event).await {
                tracing::error!(entity_type = self.manager.entity_type(), %error, "broadcast feed stopped");
                return Err(error);
            }
            count += 1;
        }
        Ok(count)
    }
}
