//! Command handling infrastructure.
//!
//! A command runs as one logical transaction against a single stream:
//! refresh the projection, let the decision function emit events into a
//! buffer, then append the buffer with the projection version as the
//! expected version. A version conflict either restarts the transaction or
//! fails it, depending on the [`ConflictPolicy`].

use std::time::{Duration, Instant};

use common::StreamId;
use event_store::{EventStore, Version, codec};
use tokio::sync::watch;

use crate::behaviour::{DomainEvent, EventSourced};
use crate::error::DomainError;
use crate::projection::{DecodePolicy, LiveProjection, Projection};

/// What to do when a commit loses the optimistic-concurrency race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Surface the conflict to the caller.
    Fail,

    /// Discard the buffered events and run the whole transaction again.
    Retry {
        /// Retries after the first attempt.
        max_retries: u32,
        /// Pause before each retry.
        backoff: Duration,
    },
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::Retry {
            max_retries: 3,
            backoff: Duration::from_millis(10),
        }
    }
}

/// Options for a [`CommandHandler`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandOptions {
    pub conflict_policy: ConflictPolicy,
    pub decode_policy: DecodePolicy,
}

impl CommandOptions {
    pub fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }
}

/// Result of a committed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome<T> {
    /// Value returned by the decision function.
    pub value: T,

    /// Stream version after the command.
    pub version: Version,

    /// Number of events the command appended.
    pub events_committed: usize,
}

/// Write buffer handed to a decision function.
///
/// Events emitted here are only persisted when the decision function returns
/// `Ok`. [`state`](Emitter::state) shows the committed state with the
/// buffered events applied.
pub struct Emitter<'a, B: EventSourced> {
    behaviour: &'a B,
    committed: &'a B::State,
    in_flight: Option<B::State>,
    events: Vec<B::Event>,
}

impl<'a, B: EventSourced> Emitter<'a, B> {
    fn new(behaviour: &'a B, committed: &'a B::State) -> Self {
        Self {
            behaviour,
            committed,
            in_flight: None,
            events: Vec::new(),
        }
    }

    /// Buffers an event.
    pub fn emit(&mut self, event: B::Event) {
        let state = self
            .in_flight
            .get_or_insert_with(|| self.committed.clone());
        self.behaviour.evolve(state, &event);
        self.events.push(event);
    }

    /// Buffers several events in order.
    pub fn emit_all(&mut self, events: impl IntoIterator<Item = B::Event>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Events buffered so far.
    pub fn emitted(&self) -> &[B::Event] {
        &self.events
    }

    /// Committed state with the buffered events applied.
    pub fn state(&self) -> &B::State {
        self.in_flight.as_ref().unwrap_or(self.committed)
    }

    fn into_events(self) -> Vec<B::Event> {
        self.events
    }
}

/// Runs commands against one stream.
///
/// The handler caches the stream's projection. It assumes it is the only
/// writer of its stream (the runtime guarantees one loop per entity id);
/// any conflict it observes is therefore logged at error level, even when
/// the retry succeeds.
pub struct CommandHandler<S, B>
where
    S: EventStore,
    B: EventSourced,
{
    store: S,
    behaviour: B,
    stream_id: StreamId,
    projection: LiveProjection<B::State>,
    options: CommandOptions,
}

impl<S, B> CommandHandler<S, B>
where
    S: EventStore,
    B: EventSourced,
{
    /// Creates a handler with an empty projection. Nothing is read until the
    /// first [`refresh`](Self::refresh) or [`execute`](Self::execute).
    pub fn new(store: S, behaviour: B, stream_id: StreamId) -> Self {
        let initial = Projection::initial(behaviour.initial_state(&stream_id));
        Self {
            store,
            behaviour,
            stream_id,
            projection: LiveProjection::new(initial),
            options: CommandOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CommandOptions) -> Self {
        self.options = options;
        self
    }

    /// Creates a handler and brings it up to date with the store.
    pub async fn load(store: S, behaviour: B, stream_id: StreamId) -> Result<Self, DomainError> {
        Self::load_with_options(store, behaviour, stream_id, CommandOptions::default()).await
    }

    pub async fn load_with_options(
        store: S,
        behaviour: B,
        stream_id: StreamId,
        options: CommandOptions,
    ) -> Result<Self, DomainError> {
        let mut handler = Self::new(store, behaviour, stream_id).with_options(options);
        handler.refresh().await?;
        Ok(handler)
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn behaviour(&self) -> &B {
        &self.behaviour
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    pub fn options(&self) -> &CommandOptions {
        &self.options
    }

    /// The cached projection, as of the last refresh.
    pub fn projection(&self) -> &Projection<B::State> {
        self.projection.get()
    }

    pub fn state(&self) -> &B::State {
        &self.projection.get().state
    }

    pub fn version(&self) -> Version {
        self.projection.get().version
    }

    /// Subscribes to projection changes: the current one, then every refresh
    /// that folded new events.
    pub fn subscribe(&self) -> watch::Receiver<Projection<B::State>> {
        self.projection.subscribe()
    }

    /// Folds events appended since the cached version into the projection.
    pub async fn refresh(&mut self) -> Result<&Projection<B::State>, DomainError> {
        let current = self.projection.get();
        let events = self
            .store
            .read_stream(self.behaviour.stream_type(), &self.stream_id, current.version)
            .await?;

        if !events.is_empty() {
            let next = current.fold(
                &self.behaviour,
                &self.stream_id,
                &events,
                self.options.decode_policy,
            )?;
            self.projection.set(next);
        }
        Ok(self.projection.get())
    }

    /// Runs `decide` as one transaction and commits what it emitted.
    ///
    /// `decide` sees the refreshed committed state and an [`Emitter`]. It may
    /// run more than once under [`ConflictPolicy::Retry`]; each run starts
    /// from a fresh refresh and an empty buffer. When it returns `Err`
    /// nothing is persisted.
    #[tracing::instrument(skip_all, fields(stream_type = self.behaviour.stream_type(), stream_id = %self.stream_id))]
    pub async fn execute<T, E, F>(&mut self, mut decide: F) -> Result<CommandOutcome<T>, E>
    where
        F: FnMut(&B::State, &mut Emitter<'_, B>) -> Result<T, E> + Send,
        T: Send,
        E: From<DomainError> + Send,
    {
        metrics::counter!("command_executions_total").increment(1);
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.refresh().await?;

            let expected = self.version();
            let (value, events) = {
                let mut emitter = Emitter::new(&self.behaviour, &self.projection.get().state);
                let value = decide(&self.projection.get().state, &mut emitter)?;
                (value, emitter.into_events())
            };

            if events.is_empty() {
                metrics::histogram!("command_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                return Ok(CommandOutcome {
                    value,
                    version: expected,
                    events_committed: 0,
                });
            }

            let bodies = events
                .iter()
                .map(codec::encode)
                .collect::<Result<Vec<_>, _>>()
                .map_err(DomainError::from)?;

            let stream_type = self.behaviour.stream_type();
            match self
                .store
                .persist_events(stream_type, &self.stream_id, expected, bodies)
                .await
            {
                Ok(version) => {
                    tracing::debug!(
                        stream_type,
                        stream_id = %self.stream_id,
                        %version,
                        events = ?events.iter().map(DomainEvent::event_type).collect::<Vec<_>>(),
                        "events committed"
                    );
                    // The projection is rebuilt from the store, never from the buffer.
                    self.refresh().await?;
                    metrics::histogram!("command_duration_seconds")
                        .record(started.elapsed().as_secs_f64());
                    return Ok(CommandOutcome {
                        value,
                        version,
                        events_committed: events.len(),
                    });
                }
                Err(error) if error.is_conflict() => {
                    tracing::error!(
                        stream_type,
                        stream_id = %self.stream_id,
                        attempt,
                        %error,
                        "version conflict on a single-writer stream"
                    );
                    match self.options.conflict_policy {
                        ConflictPolicy::Retry {
                            max_retries,
                            backoff,
                        } if attempt <= max_retries => {
                            metrics::counter!("command_conflict_retries_total").increment(1);
                            tokio::time::sleep(backoff).await;
                        }
                        ConflictPolicy::Retry { .. } => {
                            return Err(DomainError::ConflictRetriesExhausted {
                                stream_type: stream_type.to_string(),
                                stream_id: self.stream_id.clone(),
                                attempts: attempt,
                            }
                            .into());
                        }
                        ConflictPolicy::Fail => return Err(DomainError::from(error).into()),
                    }
                }
                Err(error) => return Err(DomainError::from(error).into()),
            }
        }
    }
}
