use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::StreamId;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::entity::Entity;
use crate::error::{Result, RuntimeError};
use crate::messenger::{Dispatch, Mailbox, Messenger};

/// Runtime tuning.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Messages buffered per entity id before senders wait.
    pub mailbox_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 32,
        }
    }
}

impl RuntimeConfig {
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity.max(1);
        self
    }
}

/// Registry of entity types and their running loops.
///
/// Cloning shares the registry.
#[derive(Clone, Default)]
pub struct Sharding {
    inner: Arc<ShardingInner>,
}

#[derive(Default)]
struct ShardingInner {
    config: RuntimeConfig,
    regions: Mutex<Vec<Arc<dyn Region>>>,
}

impl Sharding {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(ShardingInner {
                config,
                regions: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Registers an entity type and returns the messenger addressing it.
    ///
    /// Loops are spawned lazily, one per entity id, on the first message.
    pub async fn register<E: Entity>(&self, entity: E) -> Messenger<E::Message> {
        let region = Arc::new(EntityRegion {
            entity_type: entity.entity_type().to_string(),
            entity: Arc::new(entity),
            capacity: self.inner.config.mailbox_capacity.max(1),
            state: Mutex::new(RegionState::default()),
        });
        tracing::info!(entity_type = %region.entity_type, "entity type registered");

        self.inner
            .regions
            .lock()
            .await
            .push(region.clone() as Arc<dyn Region>);
        Messenger::new(region)
    }

    /// Stops every entity loop and waits for them to finish.
    ///
    /// Each loop receives an in-band shutdown signal behind the messages
    /// already queued, so no message is interrupted mid-handling. Messages
    /// sent afterwards fail with [`RuntimeError::ShutDown`].
    pub async fn shutdown(&self) {
        let regions: Vec<_> = self.inner.regions.lock().await.clone();
        for region in regions {
            region.shutdown().await;
        }
    }
}

#[async_trait]
trait Region: Send + Sync {
    async fn shutdown(&self);
}

struct EntityRegion<E: Entity> {
    entity_type: String,
    entity: Arc<E>,
    capacity: usize,
    state: Mutex<RegionState<E::Message>>,
}

struct RegionState<M> {
    mailboxes: HashMap<StreamId, mpsc::Sender<Mailbox<M>>>,
    loops: JoinSet<()>,
    shut_down: bool,
}

impl<M> Default for RegionState<M> {
    fn default() -> Self {
        Self {
            mailboxes: HashMap::new(),
            loops: JoinSet::new(),
            shut_down: false,
        }
    }
}

impl<E: Entity> EntityRegion<E> {
    async fn mailbox(&self, entity_id: &StreamId) -> Result<mpsc::Sender<Mailbox<E::Message>>> {
        let mut state = self.state.lock().await;
        if state.shut_down {
            return Err(RuntimeError::ShutDown {
                entity_type: self.entity_type.clone(),
            });
        }

        if let Some(sender) = state.mailboxes.get(entity_id)
            && !sender.is_closed()
        {
            return Ok(sender.clone());
        }

        // Reap loops that already exited (failed warm-up).
        while state.loops.try_join_next().is_some() {}

        let (tx, rx) = mpsc::channel(self.capacity);
        let span = tracing::info_span!(
            "entity",
            entity_type = %self.entity_type,
            entity_id = %entity_id
        );
        state.loops.spawn(
            run_entity(Arc::clone(&self.entity), entity_id.clone(), rx).instrument(span),
        );
        state.mailboxes.insert(entity_id.clone(), tx.clone());
        Ok(tx)
    }
}

#[async_trait]
impl<E: Entity> Dispatch<E::Message> for EntityRegion<E> {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    async fn dispatch(&self, entity_id: &StreamId, message: E::Message) -> Result<()> {
        let sender = self.mailbox(entity_id).await?;
        sender
            .send(Mailbox::Message(message))
            .await
            .map_err(|_| RuntimeError::MailboxClosed {
                entity_type: self.entity_type.clone(),
                entity_id: entity_id.clone(),
            })
    }
}

#[async_trait]
impl<E: Entity> Region for EntityRegion<E> {
    async fn shutdown(&self) {
        // Release the lock before waiting: loops may still message this region.
        let (mailboxes, mut loops) = {
            let mut state = self.state.lock().await;
            state.shut_down = true;
            (
                std::mem::take(&mut state.mailboxes),
                std::mem::take(&mut state.loops),
            )
        };

        for sender in mailboxes.into_values() {
            let _ = sender.send(Mailbox::Shutdown).await;
        }

        while let Some(result) = loops.join_next().await {
            if let Err(error) = result {
                tracing::error!(entity_type = %self.entity_type, %error, "entity loop panicked");
            }
        }
        tracing::info!(entity_type = %self.entity_type, "entity type stopped");
    }
}

async fn run_entity<E: Entity>(
    entity: Arc<E>,
    entity_id: StreamId,
    mut rx: mpsc::Receiver<Mailbox<E::Message>>,
) {
    let mut state = match entity.start(&entity_id).await {
        Ok(state) => state,
        Err(error) => {
            tracing::error!(%error, "entity failed to start");
            return;
        }
    };
    tracing::info!("entity started");

    while let Some(item) = rx.recv().await {
        match item {
            Mailbox::Message(message) => {
                if let Err(error) = entity.receive(&entity_id, &mut state, message).await {
                    tracing::error!(%error, "entity failed to handle message");
                }
            }
            Mailbox::Shutdown => break,
        }
    }

    entity.stop(&entity_id, state).await;
    tracing::info!("entity stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::entity::EntityError;
    use crate::messenger::Replier;

    enum CounterMessage {
        Add(i64),
        Fail,
        Get(Replier<i64>),
    }

    #[derive(Default)]
    struct Counter {
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
        stopped: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Entity for Counter {
        type Message = CounterMessage;
        type State = i64;

        fn entity_type(&self) -> &str {
            "Counter"
        }

        async fn start(&self, _entity_id: &StreamId) -> std::result::Result<i64, EntityError> {
            Ok(0)
        }

        async fn receive(
            &self,
            _entity_id: &StreamId,
            state: &mut i64,
            message: CounterMessage,
        ) -> std::result::Result<(), EntityError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match message {
                CounterMessage::Add(n) => *state += n,
                CounterMessage::Fail => return Err("boom".into()),
                CounterMessage::Get(reply) => reply.reply(*state),
            }
            Ok(())
        }

        async fn stop(&self, _entity_id: &StreamId, _state: i64) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingStart;

    #[async_trait]
    impl Entity for FailingStart {
        type Message = Replier<()>;
        type State = ();

        fn entity_type(&self) -> &str {
            "FailingStart"
        }

        async fn start(&self, _entity_id: &StreamId) -> std::result::Result<(), EntityError> {
            Err("cannot warm up".into())
        }

        async fn receive(
            &self,
            _entity_id: &StreamId,
            _state: &mut (),
            reply: Replier<()>,
        ) -> std::result::Result<(), EntityError> {
            reply.reply(());
            Ok(())
        }
    }

    #[tokio::test]
    async fn messages_are_handled_in_order_per_id() {
        let sharding = Sharding::default();
        let counter = sharding.register(Counter::default()).await;
        let id = StreamId::new("a");

        for n in 1..=5 {
            counter.send_discard(&id, CounterMessage::Add(n)).await.unwrap();
        }
        let total = counter.send(&id, CounterMessage::Get).await.unwrap();
        assert_eq!(total, 15);
    }

    #[tokio::test]
    async fn ids_have_independent_state() {
        let sharding = Sharding::default();
        let counter = sharding.register(Counter::default()).await;

        counter
            .send_discard(&StreamId::new("a"), CounterMessage::Add(2))
            .await
            .unwrap();
        counter
            .send_discard(&StreamId::new("b"), CounterMessage::Add(40))
            .await
            .unwrap();

        assert_eq!(counter.send(&StreamId::new("a"), CounterMessage::Get).await.unwrap(), 2);
        assert_eq!(counter.send(&StreamId::new("b"), CounterMessage::Get).await.unwrap(), 40);
    }

    #[tokio::test]
    async fn at_most_one_message_in_flight_per_id() {
        let sharding = Sharding::default();
        let entity = Counter::default();
        let max_in_flight = entity.max_in_flight.clone();
        let counter = sharding.register(entity).await;
        let id = StreamId::new("a");

        let senders: Vec<_> = (0..20)
            .map(|_| {
                let counter = counter.clone();
                let id = id.clone();
                tokio::spawn(async move { counter.send_discard(&id, CounterMessage::Add(1)).await })
            })
            .collect();
        for sender in senders {
            sender.await.unwrap().unwrap();
        }

        assert_eq!(counter.send(&id, CounterMessage::Get).await.unwrap(), 20);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_errors_do_not_stop_the_loop() {
        let sharding = Sharding::default();
        let counter = sharding.register(Counter::default()).await;
        let id = StreamId::new("a");

        counter.send_discard(&id, CounterMessage::Add(1)).await.unwrap();
        counter.send_discard(&id, CounterMessage::Fail).await.unwrap();
        counter.send_discard(&id, CounterMessage::Add(1)).await.unwrap();

        assert_eq!(counter.send(&id, CounterMessage::Get).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_warm_up_drops_the_reply() {
        let sharding = Sharding::default();
        let entity = sharding.register(FailingStart).await;

        let result = entity.send(&StreamId::new("x"), |reply| reply).await;
        assert!(matches!(
            result,
            Err(RuntimeError::NoReply { .. }) | Err(RuntimeError::MailboxClosed { .. })
        ));
    }

    #[tokio::test]
    async fn shutdown_drains_queue_then_stops() {
        let sharding = Sharding::default();
        let entity = Counter::default();
        let stopped = entity.stopped.clone();
        let counter = sharding.register(entity).await;

        counter
            .send_discard(&StreamId::new("a"), CounterMessage::Add(1))
            .await
            .unwrap();
        counter
            .send_discard(&StreamId::new("b"), CounterMessage::Add(1))
            .await
            .unwrap();

        sharding.shutdown().await;
        assert_eq!(stopped.load(Ordering::SeqCst), 2);

        let result = counter
            .send_discard(&StreamId::new("a"), CounterMessage::Add(1))
            .await;
        assert!(matches!(result, Err(RuntimeError::ShutDown { .. })));
    }

    #[test]
    fn config_clamps_capacity() {
        assert_eq!(RuntimeConfig::default().mailbox_capacity, 32);
        assert_eq!(RuntimeConfig::default().mailbox_capacity(0).mailbox_capacity, 1);
    }
}
