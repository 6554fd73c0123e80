//! In-memory projections of a stream.

use common::StreamId;
use event_store::{PersistedEvent, Version};
use tokio::sync::watch;

use crate::behaviour::EventSourced;
use crate::error::DomainError;

/// What to do with a stored event that does not decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodePolicy {
    /// Abort the refresh. Right for an entity's own stream, where an
    /// undecodable event means the event schema was broken.
    #[default]
    Fail,

    /// Log the event and move past it.
    Skip,
}

/// Folded state together with the stream version it reflects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection<S> {
    pub version: Version,
    pub state: S,
}

impl<S> Projection<S> {
    /// Projection of an empty stream.
    pub fn initial(state: S) -> Self {
        Self {
            version: Version::initial(),
            state,
        }
    }
}

impl<S: Clone> Projection<S> {
    /// Folds `events` on top of this projection.
    ///
    /// Events must belong to the projected stream and come in version order.
    /// On error `self` is left untouched.
    pub fn fold<B>(
        &self,
        behaviour: &B,
        stream_id: &StreamId,
        events: &[PersistedEvent],
        policy: DecodePolicy,
    ) -> Result<Self, DomainError>
    where
        B: EventSourced<State = S>,
    {
        let mut next = self.clone();
        for persisted in events {
            match persisted.decode::<B::Event>() {
                Ok(event) => behaviour.evolve(&mut next.state, &event),
                Err(source) => match policy {
                    DecodePolicy::Fail => {
                        return Err(DomainError::Decode {
                            stream_type: behaviour.stream_type().to_string(),
                            stream_id: stream_id.clone(),
                            version: persisted.version,
                            source,
                        });
                    }
                    DecodePolicy::Skip => {
                        tracing::warn!(
                            stream_type = behaviour.stream_type(),
                            %stream_id,
                            version = %persisted.version,
                            error = %source,
                            "skipping undecodable event"
                        );
                    }
                },
            }
            next.version = persisted.version;
        }
        Ok(next)
    }
}

/// A projection that publishes every change to subscribers.
///
/// Subscribers see the latest committed projection at the moment they
/// subscribe and every later one. History before that is not replayed.
#[derive(Debug)]
pub struct LiveProjection<S> {
    current: Projection<S>,
    sender: watch::Sender<Projection<S>>,
}

impl<S: Clone> LiveProjection<S> {
    pub fn new(initial: Projection<S>) -> Self {
        let (sender, _) = watch::channel(initial.clone());
        Self {
            current: initial,
            sender,
        }
    }

    pub fn get(&self) -> &Projection<S> {
        &self.current
    }

    /// Replaces the projection and notifies subscribers.
    pub fn set(&mut self, projection: Projection<S>) {
        self.sender.send_replace(projection.clone());
        self.current = projection;
    }

    pub fn subscribe(&self) -> watch::Receiver<Projection<S>> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::DomainEvent;
    use chrono::Utc;
    use event_store::Sequence;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Added {
        amount: i64,
    }

    impl DomainEvent for Added {
        fn event_type(&self) -> &'static str {
            "Added"
        }
    }

    struct Sum;

    impl EventSourced for Sum {
        type Event = Added;
        type State = i64;

        fn stream_type(&self) -> &str {
            "Sum"
        }

        fn initial_state(&self, _stream_id: &StreamId) -> i64 {
            0
        }

        fn evolve(&self, state: &mut i64, event: &Added) {
            *state += event.amount;
        }
    }

    fn persisted(version: i64, body: &[u8]) -> PersistedEvent {
        PersistedEvent {
            stream_type: "Sum".to_string(),
            stream_id: StreamId::new("s1"),
            version: Version::new(version),
            sequence: Sequence::new(version),
            created_at: Utc::now(),
            body: body.to_vec(),
        }
    }

    #[test]
    fn fold_tracks_version_and_state() {
        let events = vec![
            persisted(1, br#"{"amount":5}"#),
            persisted(2, br#"{"amount":7}"#),
        ];
        let projection = Projection::initial(0)
            .fold(&Sum, &StreamId::new("s1"), &events, DecodePolicy::Fail)
            .unwrap();

        assert_eq!(projection.version, Version::new(2));
        assert_eq!(projection.state, 12);
    }

    #[test]
    fn fail_policy_rejects_undecodable_event() {
        let events = vec![persisted(1, br#"{"amount":5}"#), persisted(2, b"not json")];
        let result = Projection::initial(0).fold(&Sum, &StreamId::new("s1"), &events, DecodePolicy::Fail);

        match result {
            Err(DomainError::Decode { version, .. }) => assert_eq!(version, Version::new(2)),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn skip_policy_advances_past_undecodable_event() {
        let events = vec![
            persisted(1, br#"{"amount":5}"#),
            persisted(2, b"not json"),
            persisted(3, br#"{"amount":1}"#),
        ];
        let projection = Projection::initial(0)
            .fold(&Sum, &StreamId::new("s1"), &events, DecodePolicy::Skip)
            .unwrap();

        assert_eq!(projection.version, Version::new(3));
        assert_eq!(projection.state, 6);
    }

    #[test]
    fn live_projection_publishes_latest_value() {
        let mut live = LiveProjection::new(Projection::initial(0));
        let mut rx = live.subscribe();

        live.set(Projection {
            version: Version::first(),
            state: 3,
        });

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().state, 3);
        assert_eq!(live.get().version, Version::first());
    }
}
