//! Forwards journal events to the saga instances they concern.

use common::StreamId;
use event_store::Sequence;
use futures_util::{Stream, StreamExt};
use runtime::SendDiscard;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{Result, SagaError};
use crate::journal::JournalEvent;

/// Maps a journal event to the id of the saga instance that handles it.
pub type Correlate<E> = fn(&JournalEvent<E>) -> Option<StreamId>;

/// Routes a typed journal to saga instances by correlation id.
///
/// Events are forwarded one at a time in journal order, so a saga instance
/// receives the events routed to it in the order they were committed.
/// Forwarding is fire-and-forget; failures are logged and the router moves
/// on. After each event the router publishes its sequence as the cursor to
/// resume from.
pub struct SagaRouter<E, Sd> {
    saga_type: String,
    sagas: Sd,
    correlate: Correlate<E>,
    cursor: watch::Sender<Sequence>,
}

impl<E, Sd> SagaRouter<E, Sd>
where
    E: Send + 'static,
    Sd: SendDiscard<JournalEvent<E>> + 'static,
{
    pub fn new(saga_type: impl Into<String>, sagas: Sd, correlate: Correlate<E>) -> Self {
        let (cursor, _) = watch::channel(Sequence::start());
        Self {
            saga_type: saga_type.into(),
            sagas,
            correlate,
            cursor,
        }
    }

    /// Sets the cursor reported before the first event is routed.
    pub fn resuming_from(self, sequence: Sequence) -> Self {
        self.cursor.send_replace(sequence);
        self
    }

    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    /// Watches the sequence of the last routed event.
    pub fn cursor(&self) -> watch::Receiver<Sequence> {
        self.cursor.subscribe()
    }

    /// Routes events until the stream ends.
    ///
    /// Store failures are logged and skipped. A decode failure (only
    /// produced under [`DecodePolicy::Fail`](domain::DecodePolicy::Fail))
    /// stops the router and is returned.
    #[tracing::instrument(skip_all, fields(saga_type = %self.saga_type))]
    pub async fn run<St>(&self, events: St) -> Result<()>
    where
        St: Stream<Item = Result<JournalEvent<E>>> + Send,
    {
        let mut events = std::pin::pin!(events);
        let cursor = *self.cursor.borrow();
        tracing::info!(saga_type = %self.saga_type, %cursor, "saga router started");

        while let Some(item) = events.next().await {
            match item {
                Ok(event) => self.route(event).await,
                Err(SagaError::EventStore(error)) => {
                    tracing::warn!(saga_type = %self.saga_type, %error, "journal read failed");
                }
                Err(error) => {
                    tracing::error!(saga_type = %self.saga_type, %error, "saga router stopped");
                    return Err(error);
                }
            }
        }

        tracing::info!(saga_type = %self.saga_type, "saga router finished");
        Ok(())
    }

    async fn route(&self, event: JournalEvent<E>) {
        let sequence = event.sequence;
        if let Some(saga_id) = (self.correlate)(&event) {
            let stream_type = event.stream_type.clone();
            match self.sagas.send_discard(&saga_id, event).await {
                Ok(()) => {
                    metrics::counter!("saga_router_forwarded_total").increment(1);
                    tracing::debug!(saga_type = %self.saga_type, %saga_id, %sequence, "event forwarded");
                }
                Err(error) => {
                    metrics::counter!("saga_router_forward_failures_total").increment(1);
                    tracing::warn!(
                        saga_type = %self.saga_type,
                        %saga_id,
                        %stream_type,
                        %sequence,
                        %error,
                        "failed to forward event"
                    );
                }
            }
        }
        self.cursor.send_replace(sequence);
    }

    /// Runs the router on its own task.
    pub fn spawn<St>(self, events: St) -> JoinHandle<Result<()>>
    where
        St: Stream<Item = Result<JournalEvent<E>>> + Send + 'static,
    {
        tokio::spawn(async move { self.run(events).await })
    }
}
