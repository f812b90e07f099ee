//! Deduplication of already processed messages
//!
//! Every message this node publishes or accepts from a peer passes through
//! [`SeenCache::mark_if_new`] exactly once. Local delivery and forwarding
//! both key off that single check, which is what makes flooding terminate.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::message::MessageId;

/// Bounded, expiring set of message ids
///
/// Entries leave the cache when they are older than the TTL or when the
/// capacity is reached, oldest first. Ids are never promoted on lookup, so
/// LRU order is insertion order.
#[derive(Debug)]
pub struct SeenCache {
    entries: Mutex<LruCache<MessageId, Instant>>,
    ttl: Duration,
}

impl SeenCache {
    /// Create a new seen cache
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Record `id` and return whether this is the first time it was seen
    pub fn mark_if_new(&self, id: MessageId) -> bool {
        self.mark_if_new_at(id, Instant::now())
    }

    fn mark_if_new_at(&self, id: MessageId, now: Instant) -> bool {
        let mut entries = self.entries.lock();

        if let Some(seen_at) = entries.peek(&id) {
            if now.saturating_duration_since(*seen_at) <= self.ttl {
                return false;
            }
        }

        let mut expired = 0;
        while let Some(seen_at) = entries.peek_lru().map(|(_, seen_at)| *seen_at) {
            if now.saturating_duration_since(seen_at) <= self.ttl {
                break;
            }
            entries.pop_lru();
            expired += 1;
        }
        if expired > 0 {
            trace!(expired, remaining = entries.len(), "expired seen message ids");
        }

        entries.put(id, now);
        true
    }

    /// Whether `id` is currently remembered
    pub fn contains(&self, id: &MessageId) -> bool {
        let entries = self.entries.lock();
        entries
            .peek(id)
            .is_some_and(|seen_at| seen_at.elapsed() <= self.ttl)
    }

    /// Number of remembered ids, including any not yet expired lazily
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Forget every remembered id
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
