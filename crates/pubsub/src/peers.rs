//! Connected peers and the topics they have advertised

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use proven_topology::NodeId;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Queue feeding a peer's writer task
pub(crate) type PeerSender = flume::Sender<Bytes>;

/// A connected peer
#[derive(Debug)]
pub(crate) struct PeerEntry {
    /// Distinguishes this connection from earlier ones to the same peer
    pub(crate) generation: u64,
    pub(crate) outbound: PeerSender,
    /// Stops this peer's reader and writer tasks
    pub(crate) cancel: CancellationToken,
    pub(crate) topics: HashSet<String>,
}

/// Registry of connected peers
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<NodeId, PeerEntry>>,
    next_generation: AtomicU64,
}

impl PeerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns the new entry's generation and the entry
    /// it replaced, if the peer was already connected.
    pub(crate) fn insert(
        &self,
        peer: NodeId,
        outbound: PeerSender,
        cancel: CancellationToken,
    ) -> (u64, Option<PeerEntry>) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let entry = PeerEntry {
            generation,
            outbound,
            cancel,
            topics: HashSet::new(),
        };

        let replaced = self.peers.write().insert(peer, entry);
        (generation, replaced)
    }

    /// Remove a peer together with all of its advertised interest
    pub(crate) fn remove(&self, peer: &NodeId) -> Option<PeerEntry> {
        self.peers.write().remove(peer)
    }

    /// Remove a peer only if it is still on the given connection
    pub(crate) fn remove_if_generation(&self, peer: &NodeId, generation: u64) -> Option<PeerEntry> {
        let mut peers = self.peers.write();
        match peers.get(peer) {
            Some(entry) if entry.generation == generation => peers.remove(peer),
            _ => None,
        }
    }

    /// Remove every peer
    pub(crate) fn drain(&self) -> Vec<(NodeId, PeerEntry)> {
        self.peers.write().drain().collect()
    }

    /// Update a peer's interest in `topic`. Returns whether anything changed;
    /// announcements from unknown peers are ignored.
    pub fn record_interest(&self, peer: &NodeId, topic: &str, interested: bool) -> bool {
        let mut peers = self.peers.write();
        let Some(entry) = peers.get_mut(peer) else {
            debug!("Ignoring interest update from unknown peer {}", peer);
            return false;
        };

        let changed = if interested {
            entry.topics.insert(topic.to_string())
        } else {
            entry.topics.remove(topic)
        };

        if changed {
            debug!(
                "Peer {} {} topic '{}'",
                peer,
                if interested { "subscribed to" } else { "unsubscribed from" },
                topic
            );
        }
        changed
    }

    /// Outbound queues of peers interested in `topic`, except `exclude`
    pub(crate) fn interested_peers(
        &self,
        topic: &str,
        exclude: Option<&NodeId>,
    ) -> Vec<(NodeId, PeerSender)> {
        self.peers
            .read()
            .iter()
            .filter(|(peer, entry)| Some(*peer) != exclude && entry.topics.contains(topic))
            .map(|(peer, entry)| (*peer, entry.outbound.clone()))
            .collect()
    }

    /// Outbound queues of every connected peer
    pub(crate) fn all_peers(&self) -> Vec<(NodeId, PeerSender)> {
        self.peers
            .read()
            .iter()
            .map(|(peer, entry)| (*peer, entry.outbound.clone()))
            .collect()
    }

    /// Connected peer ids, sorted
    pub fn peers(&self) -> Vec<NodeId> {
        let mut peers: Vec<_> = self.peers.read().keys().copied().collect();
        peers.sort();
        peers
    }

    /// Topics advertised by `peer`, or `None` if it is not connected
    pub fn peer_topics(&self, peer: &NodeId) -> Option<BTreeSet<String>> {
        self.peers
            .read()
            .get(peer)
            .map(|entry| entry.topics.iter().cloned().collect())
    }

    pub fn contains(&self, peer: &NodeId) -> bool {
        self.peers.read().contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}
