//! In-memory broker for testing and single-process scenarios.
//!
//! `InMemoryBus` implements both ports with the semantics of a real
//! broker: consumer groups, competing consumers inside a group, broadcast
//! across groups, redelivery on reject and a dead-letter list.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};

use super::subscriber::deliver;
use super::{BusError, EventBus, Publisher, SubscribeOptions, Subscriber};
use crate::context::Context;
use crate::handler::Handler;
use crate::message::{Acknowledger, Message};

/// Tuning for [`InMemoryBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryConfig {
    /// Default worker threads per subscription.
    pub concurrency: usize,
    /// Deliveries before a rejected message is dead-lettered.
    pub max_deliveries: u32,
    /// How long an idle worker sleeps before re-checking for shutdown.
    pub poll_interval: Duration,
    /// Entries kept in each inspection log (published per topic, acked,
    /// rejected, dead letters); the oldest are dropped first. `0` keeps none.
    pub history_limit: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_deliveries: 3,
            poll_interval: Duration::from_millis(50),
            history_limit: 1024,
        }
    }
}

impl InMemoryConfig {
    /// Build from string options (`concurrency`, `max_deliveries`,
    /// `poll_interval_ms`, `history_limit`). Unknown keys are ignored.
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self, BusError> {
        fn parse<T: std::str::FromStr>(
            options: &HashMap<String, String>,
            key: &str,
        ) -> Result<Option<T>, BusError> {
            options
                .get(key)
                .map(|raw| {
                    raw.parse::<T>().map_err(|_| {
                        BusError::InvalidConfig(format!("option '{key}' has invalid value '{raw}'"))
                    })
                })
                .transpose()
        }

        let mut config = Self::default();
        if let Some(concurrency) = parse::<usize>(options, "concurrency")? {
            config.concurrency = concurrency.max(1);
        }
        if let Some(max_deliveries) = parse::<u32>(options, "max_deliveries")? {
            config.max_deliveries = max_deliveries.max(1);
        }
        if let Some(poll_ms) = parse::<u64>(options, "poll_interval_ms")? {
            config.poll_interval = Duration::from_millis(poll_ms.max(1));
        }
        if let Some(history_limit) = parse::<usize>(options, "history_limit")? {
            config.history_limit = history_limit;
        }
        Ok(config)
    }
}

/// Queue of one consumer group on one topic.
struct GroupQueue {
    topic: String,
    group: String,
    queue: Mutex<VecDeque<Message>>,
    ready: Condvar,
}

impl GroupQueue {
    fn new(topic: &str, group: &str) -> Self {
        Self {
            topic: topic.to_string(),
            group: group.to_string(),
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    fn push(&self, message: Message) {
        self.queue.lock().push_back(message);
        self.ready.notify_one();
    }
}

/// Push onto a bounded log, dropping the oldest entries.
fn record<T>(log: &mut VecDeque<T>, limit: usize, entry: T) {
    if limit == 0 {
        return;
    }
    while log.len() >= limit {
        log.pop_front();
    }
    log.push_back(entry);
}

struct Shared {
    config: InMemoryConfig,
    /// topic -> group -> queue
    topics: RwLock<HashMap<String, HashMap<String, Arc<GroupQueue>>>>,
    /// Recent messages published, per topic
    published: Mutex<HashMap<String, VecDeque<Message>>>,
    acked: Mutex<VecDeque<String>>,
    rejected: Mutex<VecDeque<String>>,
    dead_letters: Mutex<VecDeque<Message>>,
    /// Queued or delivered messages not yet acked or dead-lettered
    outstanding: AtomicUsize,
    in_flight: AtomicUsize,
    closed: AtomicBool,
    /// Cancelled by `stop`; replaced so later subscriptions can run again.
    shutdown: Mutex<Context>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Settles deliveries for one group.
struct GroupAcker {
    shared: Arc<Shared>,
    group: Arc<GroupQueue>,
}

impl Acknowledger for GroupAcker {
    fn acknowledge(&self, message: &Message) {
        record(
            &mut *self.shared.acked.lock(),
            self.shared.config.history_limit,
            message.id.clone(),
        );
        self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    fn reject(&self, message: &Message) {
        record(
            &mut *self.shared.rejected.lock(),
            self.shared.config.history_limit,
            message.id.clone(),
        );
        if message.attempts() >= self.shared.config.max_deliveries {
            tracing::warn!(
                id = %message.id,
                topic = %self.group.topic,
                group = %self.group.group,
                attempts = message.attempts(),
                "message exhausted deliveries, dead-lettering"
            );
            record(
                &mut *self.shared.dead_letters.lock(),
                self.shared.config.history_limit,
                message.clone(),
            );
            self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);
        } else {
            self.group.push(message.clone());
        }
    }
}

/// In-memory broker.
///
/// Cheap to clone; clones share the same topics and workers.
///
/// ## Example
///
/// ```
/// use relaybus::bus::{InMemoryBus, Publisher, Subscriber};
/// use relaybus::handler_fn;
/// use std::time::Duration;
///
/// let bus = InMemoryBus::new();
/// bus.subscribe("q.lifecycle", "worker", handler_fn(|_ctx, _msg| Ok(()))).unwrap();
/// bus.publish("q.lifecycle", b"{}".to_vec()).unwrap();
///
/// assert!(bus.wait_idle(Duration::from_secs(1)));
/// assert_eq!(bus.acked_ids().len(), 1);
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    shared: Arc<Shared>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    /// Create a bus with default configuration.
    pub fn new() -> Self {
        Self::with_config(InMemoryConfig::default())
    }

    /// Create a bus with explicit configuration.
    pub fn with_config(config: InMemoryConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                topics: RwLock::new(HashMap::new()),
                published: Mutex::new(HashMap::new()),
                acked: Mutex::new(VecDeque::new()),
                rejected: Mutex::new(VecDeque::new()),
                dead_letters: Mutex::new(VecDeque::new()),
                outstanding: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                shutdown: Mutex::new(Context::new()),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &InMemoryConfig {
        &self.shared.config
    }

    /// Recent messages published to `topic`, in publish order.
    pub fn published(&self, topic: &str) -> Vec<Message> {
        self.shared
            .published
            .lock()
            .get(topic)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Ids of recently acknowledged deliveries, in settlement order.
    pub fn acked_ids(&self) -> Vec<String> {
        self.shared.acked.lock().iter().cloned().collect()
    }

    /// Ids of recently rejected deliveries, one entry per rejection.
    pub fn rejected_ids(&self) -> Vec<String> {
        self.shared.rejected.lock().iter().cloned().collect()
    }

    /// Recent messages that exhausted `max_deliveries`.
    pub fn dead_letters(&self) -> Vec<Message> {
        self.shared.dead_letters.lock().iter().cloned().collect()
    }

    /// Empty every inspection log. Queues and counters are untouched.
    pub fn clear_history(&self) {
        self.shared.published.lock().clear();
        self.shared.acked.lock().clear();
        self.shared.rejected.lock().clear();
        self.shared.dead_letters.lock().clear();
    }

    /// Messages waiting in the queue of `(topic, group)`.
    pub fn pending(&self, topic: &str, group: &str) -> usize {
        self.shared
            .topics
            .read()
            .get(topic)
            .and_then(|groups| groups.get(group))
            .map(|queue| queue.queue.lock().len())
            .unwrap_or(0)
    }

    /// Whether every delivered message reached a terminal outcome and no
    /// handler is still running.
    pub fn is_idle(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire) == 0
            && self.shared.outstanding.load(Ordering::Acquire) == 0
    }

    /// Block until the bus is idle or `timeout` elapses. Returns whether
    /// the bus became idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self.is_idle() {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn group_queue(&self, topic: &str, group: &str) -> Arc<GroupQueue> {
        let mut topics = self.shared.topics.write();
        let queue = topics
            .entry(topic.to_string())
            .or_default()
            .entry(group.to_string())
            .or_insert_with(|| Arc::new(GroupQueue::new(topic, group)));
        Arc::clone(queue)
    }

    fn spawn_worker(&self, queue: Arc<GroupQueue>, handler: Handler, ctx: Context) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        thread::spawn(move || {
            let acker: Arc<dyn Acknowledger> = Arc::new(GroupAcker {
                shared: Arc::clone(&shared),
                group: Arc::clone(&queue),
            });

            loop {
                let next = {
                    let mut pending = queue.queue.lock();
                    loop {
                        if ctx.is_cancelled() {
                            return;
                        }
                        if let Some(message) = pending.pop_front() {
                            shared.in_flight.fetch_add(1, Ordering::AcqRel);
                            break message;
                        }
                        queue
                            .ready
                            .wait_for(&mut pending, shared.config.poll_interval);
                    }
                };

                let attempts = next.attempts() + 1;
                let delivery =
                    next.into_delivery(&queue.topic, &queue.group, attempts, Arc::clone(&acker));
                tracing::trace!(
                    id = %delivery.id,
                    topic = %queue.topic,
                    group = %queue.group,
                    attempts,
                    "delivering message"
                );
                deliver(&ctx, &handler, &delivery);
                shared.in_flight.fetch_sub(1, Ordering::AcqRel);
            }
        })
    }

    fn notify_all_groups(&self) {
        for groups in self.shared.topics.read().values() {
            for queue in groups.values() {
                queue.ready.notify_all();
            }
        }
    }
}

impl Publisher for InMemoryBus {
    fn publish_message(&self, topic: &str, message: Message) -> Result<(), BusError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        if topic.is_empty() {
            return Err(BusError::Publish {
                topic: topic.to_string(),
                reason: "topic name is empty".into(),
            });
        }

        let limit = self.shared.config.history_limit;
        if limit > 0 {
            let mut published = self.shared.published.lock();
            record(
                published.entry(topic.to_string()).or_default(),
                limit,
                message.clone(),
            );
        }

        if let Some(groups) = self.shared.topics.read().get(topic) {
            for queue in groups.values() {
                self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
                queue.push(message.clone());
            }
        }
        Ok(())
    }

    fn close(&self) -> Result<(), BusError> {
        self.shared.closed.store(true, Ordering::Release);
        Subscriber::stop(self);
        Ok(())
    }
}

impl Subscriber for InMemoryBus {
    fn subscribe(&self, topic: &str, group: &str, handler: Handler) -> Result<(), BusError> {
        self.subscribe_with(topic, group, SubscribeOptions::default(), handler)
    }

    fn subscribe_with(
        &self,
        topic: &str,
        group: &str,
        options: SubscribeOptions,
        handler: Handler,
    ) -> Result<(), BusError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        if topic.is_empty() || group.is_empty() {
            return Err(BusError::Subscribe {
                topic: topic.to_string(),
                group: group.to_string(),
                reason: "topic and group must be non-empty".into(),
            });
        }

        let concurrency = options
            .concurrency
            .unwrap_or(self.shared.config.concurrency)
            .max(1);
        let queue = self.group_queue(topic, group);
        let ctx = self.shared.shutdown.lock().clone();

        let mut workers = self.shared.workers.lock();
        for _ in 0..concurrency {
            workers.push(self.spawn_worker(Arc::clone(&queue), Arc::clone(&handler), ctx.clone()));
        }
        tracing::debug!(topic, group, concurrency, "subscribed");
        Ok(())
    }

    fn stop(&self) {
        let ctx = std::mem::take(&mut *self.shared.shutdown.lock());
        ctx.cancel();
        self.notify_all_groups();

        let workers = std::mem::take(&mut *self.shared.workers.lock());
        let current = thread::current().id();
        for worker in workers {
            // A handler stopping its own bus must not join itself.
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                tracing::error!("in-memory bus worker panicked");
            }
        }
    }

    fn close(&self) -> Result<(), BusError> {
        Publisher::close(self)
    }
}

impl EventBus for InMemoryBus {
    fn health(&self) -> Result<(), BusError> {
        if self.shared.closed.load(Ordering::Acquire) {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }
}
