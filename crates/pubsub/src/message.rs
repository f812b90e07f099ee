//! Message identity and wire frames
//!
//! A message is identified by its publisher and that publisher's sequence
//! number, never by its content: two publishes of the same payload are two
//! messages, while every relay of one publish carries the same id.

use std::fmt;

use bytes::Bytes;
use proven_topology::NodeId;
use serde::{Deserialize, Serialize};

/// Domain separator for message id hashing
const MESSAGE_ID_DOMAIN: &[u8] = b"proven-pubsub-message-id-v1:";

/// 32-byte message identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(#[serde(with = "serde_bytes")] [u8; 32]);

impl MessageId {
    /// Raw id bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for MessageId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", hex::encode(&self.0[..8]))
    }
}

/// Compute the id of the `seq`-th message published by `publisher`.
///
/// `blake3(domain || publisher_key || seq_be)`. Originator and relays compute
/// the same value, so an id survives any number of hops.
pub fn make_id(publisher: &NodeId, seq: u64) -> MessageId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(MESSAGE_ID_DOMAIN);
    hasher.update(publisher.as_bytes());
    hasher.update(&seq.to_be_bytes());
    MessageId(*hasher.finalize().as_bytes())
}

/// A published message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    topic: String,
    publisher: NodeId,
    seq: u64,
    payload: Bytes,
}

impl Message {
    /// Build a message, deriving its id from publisher and sequence number
    pub fn new(publisher: NodeId, seq: u64, topic: impl Into<String>, payload: Bytes) -> Self {
        Self {
            id: make_id(&publisher, seq),
            topic: topic.into(),
            publisher,
            seq,
            payload,
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn publisher(&self) -> &NodeId {
        &self.publisher
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Whether the carried id matches publisher and sequence number.
    ///
    /// Frames from peers are checked with this before they touch the seen
    /// cache, so a peer cannot suppress someone else's message by forging its
    /// id.
    pub fn has_valid_id(&self) -> bool {
        self.id == make_id(&self.publisher, self.seq)
    }
}

/// Frames exchanged between peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// A published message, forwarded unchanged by relays
    Data(Message),
    /// Change in the sender's interest in a topic
    Announce { topic: String, interested: bool },
}

impl Frame {
    /// Frame type name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Data(_) => "data",
            Self::Announce { .. } => "announce",
        }
    }
}
