//! Global journal subscription.
//!
//! The journal is the merged, sequence-ordered view over every stream in the
//! store. Subscribers page through it from a cursor they track themselves and
//! then wait on the store's change notifier (or a poll interval) for more.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::stream;
use tokio::sync::watch;

use crate::store::{EventStore, EventStream};
use crate::{PersistedEvent, Sequence};

/// Selects which stream types a journal reader sees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalFilter {
    stream_types: Option<Vec<String>>,
}

impl JournalFilter {
    /// Matches every stream type.
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches a single stream type.
    pub fn stream_type(stream_type: impl Into<String>) -> Self {
        Self {
            stream_types: Some(vec![stream_type.into()]),
        }
    }

    /// Matches any of the given stream types.
    pub fn stream_types<I, T>(stream_types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            stream_types: Some(stream_types.into_iter().map(Into::into).collect()),
        }
    }

    /// Returns the selected stream types, or None when all are selected.
    pub fn selected(&self) -> Option<&[String]> {
        self.stream_types.as_deref()
    }

    pub fn matches(&self, stream_type: &str) -> bool {
        match &self.stream_types {
            Some(types) => types.iter().any(|t| t == stream_type),
            None => true,
        }
    }
}

/// Tuning for journal subscriptions.
#[derive(Debug, Clone)]
pub struct JournalOptions {
    /// Maximum number of events fetched per query.
    pub batch_size: usize,

    /// Longest wait between two queries when no change is announced.
    pub poll_interval: Duration,
}

impl Default for JournalOptions {
    fn default() -> Self {
        Self {
            batch_size: 256,
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl JournalOptions {
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

struct Subscription<S> {
    store: S,
    filter: JournalFilter,
    cursor: Sequence,
    options: JournalOptions,
    changes: watch::Receiver<Sequence>,
    buffer: VecDeque<PersistedEvent>,
    wait_first: bool,
    closed: bool,
}

impl<S: EventStore> Subscription<S> {
    async fn wait_for_change(&mut self) {
        tokio::select! {
            changed = self.changes.changed() => {
                if changed.is_err() {
                    self.closed = true;
                }
            }
            () = tokio::time::sleep(self.options.poll_interval) => {}
        }
    }
}

/// Follows the journal after `from`, yielding events in sequence order.
pub(crate) fn subscribe<S>(
    store: S,
    filter: JournalFilter,
    from: Sequence,
    options: JournalOptions,
) -> EventStream
where
    S: EventStore + 'static,
{
    let changes = store.changes();
    let subscription = Subscription {
        store,
        filter,
        cursor: from,
        options,
        changes,
        buffer: VecDeque::new(),
        wait_first: false,
        closed: false,
    };

    Box::pin(stream::unfold(subscription, |mut sub| async move {
        loop {
            if let Some(event) = sub.buffer.pop_front() {
                sub.cursor = event.sequence;
                return Some((Ok(event), sub));
            }

            if sub.wait_first {
                sub.wait_first = false;
                sub.wait_for_change().await;
            }

            // Mark the notifier as seen before querying so a commit racing
            // with the query is announced again.
            sub.changes.borrow_and_update();

            let page = sub
                .store
                .read_journal_page(&sub.filter, sub.cursor, sub.options.batch_size)
                .await;

            match page {
                Ok(events) if !events.is_empty() => {
                    sub.buffer.extend(events);
                }
                Ok(_) => {
                    if sub.closed {
                        return None;
                    }
                    sub.wait_first = true;
                }
                Err(error) => {
                    tracing::warn!(cursor = %sub.cursor, %error, "journal query failed");
                    sub.wait_first = true;
                    return Some((Err(error), sub));
                }
            }
        }
    }))
}
