use async_trait::async_trait;
use common::StreamId;

/// Failure returned by entity warm-up and message handlers.
pub type EntityError = Box<dyn std::error::Error + Send + Sync>;

/// A message handler that owns per-id state.
///
/// The runtime calls [`start`](Entity::start) once when the first message for
/// an id arrives, then [`receive`](Entity::receive) for every message in
/// mailbox order. `receive` is never called concurrently for the same id.
#[async_trait]
pub trait Entity: Send + Sync + 'static {
    /// The messages this entity accepts.
    type Message: Send + 'static;

    /// State owned by one entity loop.
    type State: Send + 'static;

    /// Name of the entity type, unique within a [`Sharding`](crate::Sharding).
    fn entity_type(&self) -> &str;

    /// Builds the state for `entity_id` before its first message is handled.
    ///
    /// A failure stops the loop; messages already queued are dropped and a
    /// later message starts a fresh loop.
    async fn start(&self, entity_id: &StreamId) -> Result<Self::State, EntityError>;

    /// Handles one message.
    ///
    /// An error is logged and the loop moves on to the next message.
    async fn receive(
        &self,
        entity_id: &StreamId,
        state: &mut Self::State,
        message: Self::Message,
    ) -> Result<(), EntityError>;

    /// Called once after the loop received its shutdown signal.
    async fn stop(&self, _entity_id: &StreamId, _state: Self::State) {}
}
