//! Event-sourced behaviour traits.

use common::{Envelope, StreamId};
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Returns the event type name, used in logs.
    fn event_type(&self) -> &'static str;
}

impl<T: DomainEvent> DomainEvent for Envelope<T> {
    fn event_type(&self) -> &'static str {
        self.body.event_type()
    }
}

/// Describes how a stream of events folds into state.
///
/// A behaviour owns no data of its own besides configuration: the state of a
/// particular stream lives in a [`Projection`](crate::Projection) held by
/// the [`CommandHandler`](crate::CommandHandler) of that stream.
pub trait EventSourced: Send + Sync + 'static {
    /// The type of events this behaviour produces and consumes.
    type Event: DomainEvent;

    /// The folded state.
    type State: Clone + Send + Sync + 'static;

    /// Returns the stream type name under which events are stored.
    fn stream_type(&self) -> &str;

    /// State of a stream without any events.
    fn initial_state(&self, stream_id: &StreamId) -> Self::State;

    /// Applies an event to the state.
    ///
    /// This method must be pure and deterministic:
    /// - Given the same state and event, it must always produce the same new state
    /// - It must not have side effects
    /// - It must not fail (events represent facts that have happened)
    fn evolve(&self, state: &mut Self::State, event: &Self::Event);
}
