//! Process-wide publish/subscribe channels.
//!
//! ```text
//!  publisher ──publish(s)──▶ Topic<T> ──offer──▶ Subscription queue ─┐
//!  (any thread)              (fan-out)           (bounded, per sub)   │
//!                                                                     ▼
//!                                          owning thread: drain ──▶ callback(s)
//! ```
//!
//! A topic is created lazily the first time its id is used and lives as
//! long as the registry. Every subscription owns a bounded queue; publish
//! copies the sample into each queue and wakes the owning thread, which
//! runs the callback later. Callbacks never run on the publisher's thread.
//!
//! A full queue drops the newest sample and counts it. Per-subscription
//! order always matches publish order.

use core::any::Any;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use core::time::Duration;
use std::sync::{Arc, Weak};

use heapless::FnvIndexMap;
use log::{debug, info, warn};

use crate::config::SUBSCRIPTION_DEPTH;
use crate::error::Error;
use crate::sync::{Mutex, Queue};
use crate::thread::{Mailbox, Thread, ThreadContext, ThreadId};

pub type TopicId = u16;

/// Distinct topic ids one registry can hold. Power of two (index map).
pub const MAX_TOPICS: usize = 32;

/// Receiving end of a topic, one per subscription.
trait Sink<T>: Send + Sync {
    /// Queue a copy of `sample`. `false` if the sample was dropped.
    fn offer(&self, sample: T) -> bool;
    /// The subscriber is gone and can be pruned.
    fn is_closed(&self) -> bool;
}

/// Delivery counters shared by a subscription and its handle.
#[derive(Debug, Default)]
struct SubscriptionStats {
    delivered: AtomicU32,
    dropped: AtomicU32,
}

// ═══════════════════════════════════════════════════════════════
//  Topic
// ═══════════════════════════════════════════════════════════════

pub struct Topic<T> {
    id: TopicId,
    subscribers: Mutex<Vec<Arc<dyn Sink<T>>>>,
    published: AtomicU32,
}

impl<T: Clone + Send + 'static> Topic<T> {
    fn new(id: TopicId) -> Self {
        Self {
            id,
            subscribers: Mutex::new(Vec::new()),
            published: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> TopicId {
        self.id
    }

    /// Fan `sample` out to every live subscription. Returns how many
    /// queued it.
    pub fn publish(&self, sample: T) -> usize {
        let snapshot: Vec<Arc<dyn Sink<T>>> = {
            let mut subscribers = self.subscribers.lock();
            subscribers.retain(|s| !s.is_closed());
            subscribers.clone()
        };
        self.published.fetch_add(1, Ordering::Relaxed);

        snapshot
            .iter()
            .filter(|sink| sink.offer(sample.clone()))
            .count()
    }

    /// Run `callback` on `owner` for every sample published from now on.
    pub fn subscribe<F>(&self, owner: &Thread, callback: F) -> TopicSubscription
    where
        F: FnMut(T) + Send + 'static,
    {
        self.subscribe_context(owner.context(), callback)
    }

    /// [`subscribe`](Self::subscribe) for code holding only the context.
    pub fn subscribe_context<F>(&self, owner: &Arc<ThreadContext>, callback: F) -> TopicSubscription
    where
        F: FnMut(T) + Send + 'static,
    {
        let stats = Arc::new(SubscriptionStats::default());
        let subscription = Arc::new(Subscription {
            topic_id: self.id,
            queue: Queue::new(),
            callback: Mutex::new(callback),
            owner: Arc::downgrade(owner),
            stats: Arc::clone(&stats),
        });
        owner.attach(Arc::clone(&subscription) as Arc<dyn Mailbox>);
        self.subscribers.lock().push(subscription);
        debug!("Topic[{}]: subscribed on thread '{}'", self.id, owner.name());

        TopicSubscription {
            topic_id: self.id,
            thread_id: owner.id(),
            stats,
        }
    }

    /// A subscription drained by hand instead of by a thread.
    pub fn subscribe_receiver(&self) -> TopicReceiver<T> {
        let sink = Arc::new(ReceiverSink {
            topic_id: self.id,
            queue: Queue::new(),
            closed: AtomicBool::new(false),
            stats: SubscriptionStats::default(),
        });
        self.subscribers.lock().push(Arc::clone(&sink) as Arc<dyn Sink<T>>);
        TopicReceiver { sink }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .iter()
            .filter(|s| !s.is_closed())
            .count()
    }

    pub fn published(&self) -> u32 {
        self.published.load(Ordering::Relaxed)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Subscriptions
// ═══════════════════════════════════════════════════════════════

/// Callback subscription: queue on publish, invoke on drain.
struct Subscription<T, F> {
    topic_id: TopicId,
    queue: Queue<T, SUBSCRIPTION_DEPTH>,
    callback: Mutex<F>,
    owner: Weak<ThreadContext>,
    stats: Arc<SubscriptionStats>,
}

impl<T, F> Sink<T> for Subscription<T, F>
where
    T: Send,
    F: FnMut(T) + Send,
{
    fn offer(&self, sample: T) -> bool {
        let Some(owner) = self.owner.upgrade() else {
            return false;
        };
        if self.queue.try_enqueue(sample).is_err() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Topic[{}]: queue full on thread '{}', sample dropped",
                self.topic_id,
                owner.name()
            );
            return false;
        }
        owner.notify();
        true
    }

    fn is_closed(&self) -> bool {
        self.owner.strong_count() == 0
    }
}

impl<T, F> Mailbox for Subscription<T, F>
where
    T: Send,
    F: FnMut(T) + Send,
{
    fn drain(&self) -> usize {
        let mut delivered = 0;
        while let Some(sample) = self.queue.try_dequeue() {
            (self.callback.lock())(sample);
            delivered += 1;
        }
        self.stats
            .delivered
            .fetch_add(delivered as u32, Ordering::Relaxed);
        delivered
    }
}

/// Handle to a callback subscription.
#[derive(Debug, Clone)]
pub struct TopicSubscription {
    topic_id: TopicId,
    thread_id: ThreadId,
    stats: Arc<SubscriptionStats>,
}

impl TopicSubscription {
    pub fn topic_id(&self) -> TopicId {
        self.topic_id
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Samples handed to the callback so far.
    pub fn delivered(&self) -> u32 {
        self.stats.delivered.load(Ordering::Relaxed)
    }

    /// Samples lost to a full queue.
    pub fn dropped(&self) -> u32 {
        self.stats.dropped.load(Ordering::Relaxed)
    }
}

struct ReceiverSink<T> {
    topic_id: TopicId,
    queue: Queue<T, SUBSCRIPTION_DEPTH>,
    closed: AtomicBool,
    stats: SubscriptionStats,
}

impl<T: Send> Sink<T> for ReceiverSink<T> {
    fn offer(&self, sample: T) -> bool {
        if self.is_closed() {
            return false;
        }
        if self.queue.try_enqueue(sample).is_err() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Topic[{}]: receiver full, sample dropped", self.topic_id);
            return false;
        }
        true
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Pull-style subscription. Unsubscribes on drop.
pub struct TopicReceiver<T> {
    sink: Arc<ReceiverSink<T>>,
}

impl<T: Send> TopicReceiver<T> {
    pub fn topic_id(&self) -> TopicId {
        self.sink.topic_id
    }

    pub fn try_recv(&self) -> Option<T> {
        self.counted(self.sink.queue.try_dequeue())
    }

    /// Block until a sample arrives.
    pub fn recv(&self) -> T {
        let sample = self.sink.queue.dequeue();
        self.sink.stats.delivered.fetch_add(1, Ordering::Relaxed);
        sample
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        self.counted(self.sink.queue.dequeue_timeout(timeout))
    }

    pub fn pending(&self) -> usize {
        self.sink.queue.len()
    }

    pub fn dropped(&self) -> u32 {
        self.sink.stats.dropped.load(Ordering::Relaxed)
    }

    fn counted(&self, sample: Option<T>) -> Option<T> {
        if sample.is_some() {
            self.sink.stats.delivered.fetch_add(1, Ordering::Relaxed);
        }
        sample
    }
}

impl<T> Drop for TopicReceiver<T> {
    fn drop(&mut self) {
        self.sink.closed.store(true, Ordering::Release);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Registry
// ═══════════════════════════════════════════════════════════════

struct TopicEntry {
    type_name: &'static str,
    topic: Arc<dyn Any + Send + Sync>,
}

/// Topics by id. Cloning shares the same registry.
///
/// Entries are never removed: a topic, once named, lives as long as the
/// registry does.
#[derive(Clone, Default)]
pub struct TopicRegistry {
    topics: Arc<Mutex<FnvIndexMap<TopicId, TopicEntry, MAX_TOPICS>>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The topic for `id`, created on first use. Fails with
    /// [`Error::TypeMismatch`] when `id` already carries another type.
    pub fn topic<T: Clone + Send + 'static>(&self, id: TopicId) -> crate::Result<Arc<Topic<T>>> {
        let mut topics = self.topics.lock();
        if let Some(entry) = topics.get(&id) {
            return Arc::clone(&entry.topic).downcast::<Topic<T>>().map_err(|_| {
                warn!(
                    "Topic[{}]: requested as {}, registered as {}",
                    id,
                    core::any::type_name::<T>(),
                    entry.type_name
                );
                Error::TypeMismatch(id)
            });
        }

        let topic = Arc::new(Topic::<T>::new(id));
        let entry = TopicEntry {
            type_name: core::any::type_name::<T>(),
            topic: Arc::clone(&topic) as Arc<dyn Any + Send + Sync>,
        };
        topics
            .insert(id, entry)
            .map_err(|_| Error::ParameterInvalid("topic registry full"))?;
        info!("Topic[{}]: created ({})", id, core::any::type_name::<T>());
        Ok(topic)
    }

    pub fn publish<T: Clone + Send + 'static>(&self, id: TopicId, sample: T) -> crate::Result<usize> {
        Ok(self.topic::<T>(id)?.publish(sample))
    }

    pub fn subscribe<T, F>(&self, id: TopicId, owner: &Thread, callback: F) -> crate::Result<TopicSubscription>
    where
        T: Clone + Send + 'static,
        F: FnMut(T) + Send + 'static,
    {
        Ok(self.topic::<T>(id)?.subscribe(owner, callback))
    }

    pub fn subscribe_receiver<T: Clone + Send + 'static>(
        &self,
        id: TopicId,
    ) -> crate::Result<TopicReceiver<T>> {
        Ok(self.topic::<T>(id)?.subscribe_receiver())
    }

    pub fn contains(&self, id: TopicId) -> bool {
        self.topics.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.topics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.lock().is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────
