//! Engine statistics

use serde::{Deserialize, Serialize};

/// Counters describing what the engine has done since it was created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubSubStats {
    /// Messages published by this node
    pub messages_published: u64,
    /// Data messages accepted from peers
    pub messages_received: u64,
    /// Payloads handed to local subscriptions
    pub messages_delivered: u64,
    /// Data frames queued for peers, including relays
    pub frames_forwarded: u64,
    /// Data frames dropped because their id had already been seen
    pub duplicates_dropped: u64,
    /// Frames from peers that failed to decode or validate
    pub malformed_dropped: u64,
    /// Frames dropped because a peer's outbound queue was full
    pub outbound_dropped: u64,
    /// Unread payloads discarded because a subscription's buffer was full
    pub subscriber_overflows: u64,
}
