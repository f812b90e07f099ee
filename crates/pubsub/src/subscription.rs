//! Local subscriptions
//!
//! Each local subscription owns a bounded mailbox. Delivery never waits on a
//! subscriber: when a mailbox is full its oldest unread payload is dropped to
//! make room, so one slow consumer cannot stall the dispatch path.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::pin::pin;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use futures::Stream;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::trace;

/// Identifier of a local subscription, unique per engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A row of `get_subscriptions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEntry {
    pub id: SubscriptionId,
    pub topic: String,
}

/// Outcome of pushing a payload into a mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Push {
    Queued,
    /// Queued after dropping the oldest unread payload
    Overflowed,
    Closed,
}

/// Bounded drop-oldest buffer behind a subscription handle
#[derive(Debug)]
pub(crate) struct Mailbox {
    queue: Mutex<VecDeque<Bytes>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

impl Mailbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn push(&self, payload: Bytes) -> Push {
        let mut queue = self.queue.lock();
        // Checked under the queue lock so a push cannot race past close()
        if self.closed.load(Ordering::Acquire) {
            return Push::Closed;
        }

        let outcome = if queue.len() >= self.capacity {
            queue.pop_front();
            Push::Overflowed
        } else {
            Push::Queued
        };
        queue.push_back(payload);
        drop(queue);

        self.notify.notify_one();
        outcome
    }

    /// Stop accepting payloads; already buffered payloads stay readable
    pub(crate) fn close(&self) {
        let queue = self.queue.lock();
        self.closed.store(true, Ordering::Release);
        drop(queue);
        self.notify.notify_waiters();
    }

    /// Stop accepting payloads and discard anything unread
    pub(crate) fn close_and_clear(&self) {
        let mut queue = self.queue.lock();
        self.closed.store(true, Ordering::Release);
        queue.clear();
        drop(queue);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn try_pop(&self) -> Option<Bytes> {
        self.queue.lock().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub(crate) async fn recv(&self) -> Option<Bytes> {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();

            if let Some(payload) = self.try_pop() {
                return Some(payload);
            }
            if self.is_closed() {
                return None;
            }

            notified.await;
        }
    }
}

/// Removes a subscription from whatever table created it
pub(crate) trait Unsubscriber: Send + Sync {
    fn cancel_subscription(&self, id: SubscriptionId);
}

/// Handle for an active subscription
///
/// Yields every payload published to its topic after it was created, until it
/// is cancelled, its topic is unsubscribed, or the engine stops. Dropping the
/// handle cancels it.
pub struct Subscription {
    id: SubscriptionId,
    topic: String,
    mailbox: Arc<Mailbox>,
    cancelled: AtomicBool,
    owner: Weak<dyn Unsubscriber>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        topic: String,
        mailbox: Arc<Mailbox>,
        owner: Weak<dyn Unsubscriber>,
    ) -> Self {
        Self {
            id,
            topic,
            mailbox,
            cancelled: AtomicBool::new(false),
            owner,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next payload. Returns `None` once the subscription has
    /// ended and its buffer is drained.
    pub async fn recv(&self) -> Option<Bytes> {
        self.mailbox.recv().await
    }

    /// Take the next buffered payload without waiting
    pub fn try_recv(&self) -> Option<Bytes> {
        self.mailbox.try_pop()
    }

    /// Number of buffered, unread payloads
    pub fn pending(&self) -> usize {
        self.mailbox.len()
    }

    /// Whether the subscription still receives new payloads
    pub fn is_active(&self) -> bool {
        !self.mailbox.is_closed()
    }

    /// Cancel the subscription.
    ///
    /// Takes effect before the next delivery attempt; unread payloads are
    /// discarded.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        self.mailbox.close_and_clear();
        if let Some(owner) = self.owner.upgrade() {
            owner.cancel_subscription(self.id);
        }
    }

    /// Consume the handle as a stream of payloads
    pub fn into_stream(self) -> impl Stream<Item = Bytes> + Send + 'static {
        futures::stream::unfold(self, |subscription| async move {
            let payload = subscription.recv().await?;
            Some((payload, subscription))
        })
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Result of fanning a payload out to local subscribers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Mailboxes that accepted the payload
    pub delivered: usize,
    /// Of those, mailboxes that had to drop an older payload
    pub overflowed: usize,
}

#[derive(Debug, Default)]
struct TableState {
    /// Topic -> subscriptions on it, in creation order
    by_topic: HashMap<String, BTreeMap<SubscriptionId, Arc<Mailbox>>>,
    /// Reverse index, ordered by creation
    topic_of: BTreeMap<SubscriptionId, String>,
}

/// Local subscriptions keyed by topic
#[derive(Debug)]
pub struct SubscriptionTable {
    state: RwLock<TableState>,
    next_id: AtomicU64,
    buffer_size: usize,
}

impl SubscriptionTable {
    /// Create an empty table whose mailboxes hold `buffer_size` payloads
    pub fn new(buffer_size: usize) -> Self {
        Self {
            state: RwLock::new(TableState::default()),
            next_id: AtomicU64::new(1),
            buffer_size,
        }
    }

    /// Register a new subscription. The flag is true when it is the first
    /// local subscription on `topic`.
    pub(crate) fn add(&self, topic: &str) -> (SubscriptionId, Arc<Mailbox>, bool) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mailbox = Arc::new(Mailbox::new(self.buffer_size));

        let mut state = self.state.write();
        let subscribers = state.by_topic.entry(topic.to_string()).or_default();
        let first = subscribers.is_empty();
        subscribers.insert(id, mailbox.clone());
        state.topic_of.insert(id, topic.to_string());

        (id, mailbox, first)
    }

    /// Remove one subscription. Returns its topic and whether it was the last
    /// one on that topic.
    pub(crate) fn remove(&self, id: SubscriptionId) -> Option<(String, bool)> {
        let mut state = self.state.write();
        let topic = state.topic_of.remove(&id)?;

        let mut last = false;
        if let Some(subscribers) = state.by_topic.get_mut(&topic) {
            if let Some(mailbox) = subscribers.remove(&id) {
                mailbox.close();
            }
            if subscribers.is_empty() {
                state.by_topic.remove(&topic);
                last = true;
            }
        }

        Some((topic, last))
    }

    /// Remove every subscription on `topic`, closing their handles. Returns
    /// how many were removed.
    pub(crate) fn remove_topic(&self, topic: &str) -> usize {
        let mut state = self.state.write();
        let Some(subscribers) = state.by_topic.remove(topic) else {
            return 0;
        };

        for (id, mailbox) in &subscribers {
            state.topic_of.remove(id);
            mailbox.close();
        }

        subscribers.len()
    }

    /// Close every handle and empty the table
    pub(crate) fn close_all(&self) -> usize {
        let mut state = self.state.write();
        let count = state.topic_of.len();
        for mailbox in state.by_topic.values().flat_map(BTreeMap::values) {
            mailbox.close();
        }
        state.by_topic.clear();
        state.topic_of.clear();
        count
    }

    /// Push `payload` into every mailbox subscribed to `topic`
    pub fn deliver(&self, topic: &str, payload: &Bytes) -> DeliveryReport {
        let state = self.state.read();
        let mut report = DeliveryReport::default();

        let Some(subscribers) = state.by_topic.get(topic) else {
            return report;
        };

        for (id, mailbox) in subscribers {
            match mailbox.push(payload.clone()) {
                Push::Queued => report.delivered += 1,
                Push::Overflowed => {
                    report.delivered += 1;
                    report.overflowed += 1;
                    trace!("Subscription {} full, dropped oldest payload", id);
                }
                Push::Closed => {}
            }
        }

        report
    }

    /// Current local subscriptions in creation order
    pub fn entries(&self) -> Vec<SubscriptionEntry> {
        self.state
            .read()
            .topic_of
            .iter()
            .map(|(id, topic)| SubscriptionEntry {
                id: *id,
                topic: topic.clone(),
            })
            .collect()
    }

    /// Topics with at least one local subscription
    pub fn topics(&self) -> BTreeSet<String> {
        self.state.read().by_topic.keys().cloned().collect()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.state
            .read()
            .by_topic
            .get(topic)
            .map_or(0, BTreeMap::len)
    }

    pub fn len(&self) -> usize {
        self.state.read().topic_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
