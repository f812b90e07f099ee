//! Configuration for the pubsub engine

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the PubSub engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    /// Maximum number of message ids remembered for deduplication
    pub seen_cache_capacity: usize,
    /// How long a message id is remembered for deduplication
    pub seen_cache_ttl: Duration,
    /// Payloads buffered per local subscription before the oldest is dropped
    pub subscriber_buffer_size: usize,
    /// Frames queued per peer before new frames for that peer are dropped
    pub peer_queue_size: usize,
    /// Maximum payload size accepted by `publish`
    pub max_payload_size: usize,
    /// Maximum encoded frame size accepted from peers
    pub max_frame_size: usize,
    /// Maximum topic length in bytes
    pub max_topic_length: usize,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            seen_cache_capacity: 10_000,
            seen_cache_ttl: Duration::from_secs(120),
            subscriber_buffer_size: 1000,
            peer_queue_size: 1000,
            max_payload_size: 1024 * 1024,    // 1MB
            max_frame_size: 2 * 1024 * 1024, // 2MB
            max_topic_length: 256,
        }
    }
}
