use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use common::StreamId;
use tokio::sync::oneshot;

use crate::error::{Result, RuntimeError};

/// Item carried by an entity mailbox.
pub(crate) enum Mailbox<M> {
    Message(M),
    /// Ends the loop once every message queued before it is handled.
    Shutdown,
}

/// Routes a message to the loop owning `entity_id`, starting it if needed.
#[async_trait]
pub(crate) trait Dispatch<M>: Send + Sync {
    fn entity_type(&self) -> &str;

    async fn dispatch(&self, entity_id: &StreamId, message: M) -> Result<()>;
}

/// Cloneable handle for sending messages to one entity type.
pub struct Messenger<M> {
    region: Arc<dyn Dispatch<M>>,
}

impl<M> Clone for Messenger<M> {
    fn clone(&self) -> Self {
        Self {
            region: Arc::clone(&self.region),
        }
    }
}

impl<M> fmt::Debug for Messenger<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Messenger")
            .field("entity_type", &self.region.entity_type())
            .finish()
    }
}

impl<M: Send + 'static> Messenger<M> {
    pub(crate) fn new(region: Arc<dyn Dispatch<M>>) -> Self {
        Self { region }
    }

    pub fn entity_type(&self) -> &str {
        self.region.entity_type()
    }

    /// Enqueues `message` for `entity_id` without waiting for it to be handled.
    ///
    /// Waits only for mailbox capacity.
    pub async fn send_discard(&self, entity_id: &StreamId, message: M) -> Result<()> {
        self.region.dispatch(entity_id, message).await
    }

    /// Sends a message built around a [`Replier`] and waits for the answer.
    ///
    /// ```ignore
    /// let stock = inventory
    ///     .send(&product_id, |reply| InventoryCommand::GetCurrentStock { reply })
    ///     .await?;
    /// ```
    pub async fn send<R, F>(&self, entity_id: &StreamId, message: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(Replier<R>) -> M + Send,
    {
        let (replier, rx) = Replier::channel();
        self.region.dispatch(entity_id, message(replier)).await?;
        rx.await.map_err(|_| RuntimeError::NoReply {
            entity_type: self.entity_type().to_string(),
            entity_id: entity_id.clone(),
        })
    }
}

/// One-shot reply handle embedded in request messages.
pub struct Replier<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Replier<T> {
    /// Creates a replier together with the receiver of its answer.
    pub fn channel() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Answers the request. A caller that stopped waiting is ignored.
    pub fn reply(self, value: T) {
        let _ = self.tx.send(value);
    }

    /// Returns true if the caller stopped waiting for the answer.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> fmt::Debug for Replier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replier")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Fire-and-forget delivery of `M` to an entity id.
///
/// Saga routing and broadcast depend on this seam rather than on a concrete
/// [`Messenger`], which keeps them testable with recording fakes.
#[async_trait]
pub trait SendDiscard<M>: Send + Sync {
    async fn send_discard(&self, entity_id: &StreamId, message: M) -> Result<()>;
}

#[async_trait]
impl<M: Send + 'static> SendDiscard<M> for Messenger<M> {
    async fn send_discard(&self, entity_id: &StreamId, message: M) -> Result<()> {
        Messenger::send_discard(self, entity_id, message).await
    }
}

#[async_trait]
impl<M: Send + 'static, T: SendDiscard<M> + ?Sized> SendDiscard<M> for Arc<T> {
    async fn send_discard(&self, entity_id: &StreamId, message: M) -> Result<()> {
        (**self).send_discard(entity_id, message).await
    }
}
