//! The flooding pubsub engine
//!
//! Accepts local subscribe/unsubscribe/publish calls, consumes frames from
//! every connected peer, deduplicates through the seen cache, delivers to
//! local subscriptions and floods new messages on to every other interested
//! peer.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use flume::TrySendError;
use parking_lot::{Mutex, RwLock};
use proven_topology::NodeId;
use proven_transport::{Connection, TransportError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::codec::{decode_frame, encode_frame};
use crate::config::PubSubConfig;
use crate::error::{PubSubError, PubSubResult};
use crate::lifecycle::{NodeState, RunState};
use crate::message::{Frame, Message, MessageId};
use crate::peers::{PeerRegistry, PeerSender};
use crate::seen::SeenCache;
use crate::stats::PubSubStats;
use crate::subscription::{
    DeliveryReport, Subscription, SubscriptionEntry, SubscriptionId, SubscriptionTable,
    Unsubscriber,
};

/// How long a stopping writer keeps sending frames that were already queued
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Internal state shared by the engine handle, its tasks and its subscriptions
struct EngineInner {
    /// Our node ID, also the publisher identity of our messages
    local_node_id: NodeId,
    config: PubSubConfig,
    /// Externally owned node state
    node_state: watch::Receiver<NodeState>,
    run_state: RwLock<RunState>,
    /// Last sequence number used for a publish
    last_seq: AtomicU64,
    seen: SeenCache,
    subscriptions: SubscriptionTable,
    peers: PeerRegistry,
    /// Held while local interest changes and while a new peer is sent our
    /// interest set, so announcements are never reordered
    interest_lock: Mutex<()>,
    stats: RwLock<PubSubStats>,
    /// Task tracker for background tasks
    task_tracker: TaskTracker,
    /// Cancellation token for graceful shutdown
    cancellation_token: CancellationToken,
}

/// Flooding publish/subscribe engine for one node
///
/// Cheap to clone; all clones drive the same engine. Must be used from
/// within a Tokio runtime once started.
#[derive(Clone)]
pub struct PubSub {
    inner: Arc<EngineInner>,
}

impl PubSub {
    /// Create a new engine. It does nothing until [`start`](Self::start).
    pub fn new(
        local_node_id: NodeId,
        config: PubSubConfig,
        node_state: watch::Receiver<NodeState>,
    ) -> Self {
        let inner = Arc::new(EngineInner {
            local_node_id,
            seen: SeenCache::new(config.seen_cache_capacity, config.seen_cache_ttl),
            subscriptions: SubscriptionTable::new(config.subscriber_buffer_size),
            peers: PeerRegistry::new(),
            config,
            node_state,
            run_state: RwLock::new(RunState::Uninitialized),
            last_seq: AtomicU64::new(initial_seq()),
            interest_lock: Mutex::new(()),
            stats: RwLock::new(PubSubStats::default()),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        });

        Self { inner }
    }

    /// Start the engine.
    ///
    /// Fails with `NotOnline` unless the node is started. On success the
    /// engine watches the node state and stops itself if the node goes
    /// offline.
    pub fn start(&self) -> PubSubResult<()> {
        {
            let mut run_state = self.inner.run_state.write();
            match *run_state {
                RunState::Running => return Err(PubSubError::AlreadyStarted),
                RunState::Stopped => return Err(PubSubError::NotRunning),
                RunState::Uninitialized => {}
            }

            let node_state = *self.inner.node_state.borrow();
            if !node_state.is_online() {
                warn!(
                    "Refusing to start pubsub on node {} in state {:?}",
                    self.inner.local_node_id, node_state
                );
                return Err(PubSubError::NotOnline);
            }

            *run_state = RunState::Running;
        }

        self.spawn_node_state_watcher();

        info!("PubSub started for node {}", self.inner.local_node_id);
        Ok(())
    }

    /// Stop the engine and wait for its background tasks to finish.
    ///
    /// Closes every local subscription and drops every peer. Calling it on an
    /// engine that is not running does nothing.
    pub async fn shutdown(&self) {
        self.inner.stop("shutdown requested");
        self.inner.task_tracker.close();
        self.inner.task_tracker.wait().await;
    }

    /// Subscribe to a topic
    pub fn subscribe(&self, topic: &str) -> PubSubResult<Subscription> {
        self.inner.ensure_running()?;
        self.inner.validate_topic(topic)?;

        let (id, mailbox) = {
            let _guard = self.inner.interest_lock.lock();
            let (id, mailbox, first) = self.inner.subscriptions.add(topic);

            // The engine may have stopped since the gate was checked
            if *self.inner.run_state.read() != RunState::Running {
                self.inner.subscriptions.remove(id);
                return Err(PubSubError::NotRunning);
            }

            if first {
                self.inner.announce(topic, true);
            }
            (id, mailbox)
        };

        debug!("Local subscription {} created for topic '{}'", id, topic);

        let owner: Weak<dyn Unsubscriber> = Arc::downgrade(&self.inner) as Weak<dyn Unsubscriber>;
        Ok(Subscription::new(id, topic.to_string(), mailbox, owner))
    }

    /// Remove every local subscription on a topic.
    ///
    /// Unsubscribing from a topic with no local subscriptions is a no-op.
    pub fn unsubscribe(&self, topic: &str) -> PubSubResult<()> {
        self.inner.ensure_running()?;
        self.inner.validate_topic(topic)?;

        let _guard = self.inner.interest_lock.lock();
        let removed = self.inner.subscriptions.remove_topic(topic);
        if removed > 0 {
            debug!("Removed {} local subscriptions for topic '{}'", removed, topic);
            self.inner.announce(topic, false);
        }

        Ok(())
    }

    /// Publish a payload to a topic.
    ///
    /// Delivery to local subscriptions and peers happens before this returns
    /// but never waits on them: full subscriber buffers drop their oldest
    /// payload and full peer queues drop the frame.
    pub fn publish(&self, topic: &str, payload: impl Into<Bytes>) -> PubSubResult<MessageId> {
        let payload = payload.into();

        self.inner.ensure_running()?;
        self.inner.validate_topic(topic)?;
        if payload.is_empty() {
            return Err(PubSubError::MissingPayload);
        }
        if payload.len() > self.inner.config.max_payload_size {
            return Err(PubSubError::PayloadTooLarge {
                size: payload.len(),
                max: self.inner.config.max_payload_size,
            });
        }

        let seq = self.inner.last_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let message = Message::new(self.inner.local_node_id, seq, topic, payload);
        let frame = encode_frame(&Frame::Data(message.clone()))?;

        self.inner.seen.mark_if_new(message.id());
        let report = self.inner.deliver_locally(topic, message.payload());
        let forwarded = self.inner.forward(topic, &frame, None);
        self.inner.stats.write().messages_published += 1;

        debug!(
            "Published {:?} on '{}' to {} local subscriptions and {} peers",
            message.id(),
            topic,
            report.delivered,
            forwarded
        );

        Ok(message.id())
    }

    /// Current local subscriptions in creation order
    pub fn get_subscriptions(&self) -> PubSubResult<Vec<SubscriptionEntry>> {
        self.inner.ensure_running()?;
        Ok(self.inner.subscriptions.entries())
    }

    /// Attach a newly connected peer.
    ///
    /// Replaces any existing connection to the same peer. The peer is sent
    /// our current interest set, then its frames are read until the
    /// connection closes or the peer is disconnected.
    pub fn on_peer_connected<C>(&self, peer: NodeId, connection: C) -> PubSubResult<()>
    where
        C: Connection,
    {
        self.inner.ensure_running()?;

        let connection: Arc<dyn Connection> = Arc::new(connection);
        let (outbound_tx, outbound_rx) = flume::bounded(self.inner.config.peer_queue_size.max(1));
        let peer_token = self.inner.cancellation_token.child_token();

        let generation = self
            .inner
            .register_peer(peer, &outbound_tx, &peer_token)?;

        self.spawn_writer(peer, connection.clone(), outbound_rx, peer_token.clone());
        self.spawn_reader(peer, generation, connection, peer_token);

        info!("Peer {} connected to node {}", peer, self.inner.local_node_id);
        Ok(())
    }

    /// Detach a peer. Returns whether it was connected.
    ///
    /// Everything the peer advertised is forgotten; messages it missed are
    /// not replayed.
    pub fn on_peer_disconnected(&self, peer: &NodeId) -> bool {
        match self.inner.peers.remove(peer) {
            Some(entry) => {
                entry.cancel.cancel();
                info!("Peer {} disconnected from node {}", peer, self.inner.local_node_id);
                true
            }
            None => false,
        }
    }

    /// Record a peer's interest change as if it had announced it
    pub fn record_peer_interest(&self, peer: &NodeId, topic: &str, interested: bool) -> bool {
        self.inner.peers.record_interest(peer, topic, interested)
    }

    /// Connected peers, sorted
    pub fn peers(&self) -> Vec<NodeId> {
        self.inner.peers.peers()
    }

    /// Topics advertised by a connected peer
    pub fn peer_topics(&self, peer: &NodeId) -> Option<BTreeSet<String>> {
        self.inner.peers.peer_topics(peer)
    }

    pub fn local_node_id(&self) -> &NodeId {
        &self.inner.local_node_id
    }

    pub fn config(&self) -> &PubSubConfig {
        &self.inner.config
    }

    pub fn run_state(&self) -> RunState {
        *self.inner.run_state.read()
    }

    pub fn is_running(&self) -> bool {
        self.run_state() == RunState::Running
    }

    /// Snapshot of the engine's counters
    pub fn stats(&self) -> PubSubStats {
        self.inner.stats.read().clone()
    }

    fn spawn_node_state_watcher(&self) {
        let mut node_state = self.inner.node_state.clone();
        let inner = Arc::downgrade(&self.inner);
        let cancellation = self.inner.cancellation_token.clone();

        self.inner.task_tracker.spawn(async move {
            loop {
                tokio::select! {
                    changed = node_state.changed() => {
                        let online = changed.is_ok() && node_state.borrow_and_update().is_online();
                        if !online {
                            if let Some(inner) = inner.upgrade() {
                                inner.stop("node went offline");
                            }
                            break;
                        }
                    }
                    () = cancellation.cancelled() => break,
                }
            }
            trace!("Node state watcher stopped");
        });
    }

    fn spawn_writer(
        &self,
        peer: NodeId,
        connection: Arc<dyn Connection>,
        outbound: flume::Receiver<Bytes>,
        token: CancellationToken,
    ) {
        self.inner.task_tracker.spawn(async move {
            let mut healthy = true;
            loop {
                tokio::select! {
                    frame = outbound.recv_async() => match frame {
                        Ok(frame) => {
                            if let Err(e) = connection.send(frame).await {
                                debug!("Failed to send frame to peer {}: {}", peer, e);
                                healthy = false;
                                break;
                            }
                        }
                        Err(_) => break,
                    },
                    () = token.cancelled() => break,
                }
            }

            // Frames queued before the stop still go out
            if healthy {
                let flush = async {
                    let mut flushed = 0usize;
                    while let Ok(frame) = outbound.try_recv() {
                        if connection.send(frame).await.is_err() {
                            break;
                        }
                        flushed += 1;
                    }
                    flushed
                };
                match tokio::time::timeout(WRITER_FLUSH_TIMEOUT, flush).await {
                    Ok(0) => {}
                    Ok(flushed) => trace!("Flushed {} frames to peer {}", flushed, peer),
                    Err(_) => debug!("Timed out flushing frames to peer {}", peer),
                }
            }

            // The writer owns closing, so the peer sees every flushed frame first
            if let Err(e) = connection.close().await {
                debug!("Error closing connection to peer {}: {}", peer, e);
            }
            trace!("Writer for peer {} stopped", peer);
        });
    }

    fn spawn_reader(
        &self,
        peer: NodeId,
        generation: u64,
        connection: Arc<dyn Connection>,
        token: CancellationToken,
    ) {
        let inner = self.inner.clone();

        self.inner.task_tracker.spawn(async move {
            loop {
                tokio::select! {
                    result = connection.recv() => match result {
                        Ok(frame) => inner.handle_frame(&peer, frame),
                        Err(TransportError::ConnectionClosed) => {
                            debug!("Connection to peer {} closed", peer);
                            break;
                        }
                        Err(e) => {
                            warn!("Failed to receive from peer {}: {}", peer, e);
                            break;
                        }
                    },
                    () = token.cancelled() => break,
                }
            }

            // The connection went away on its own; treat it as a disconnect
            if inner.peers.remove_if_generation(&peer, generation).is_some() {
                info!("Peer {} disconnected from node {}", peer, inner.local_node_id);
            }

            // Stops the writer, which closes the connection
            token.cancel();
            trace!("Reader for peer {} stopped", peer);
        });
    }
}

impl fmt::Debug for PubSub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PubSub")
            .field("local_node_id", &self.inner.local_node_id)
            .field("run_state", &self.run_state())
            .field("subscriptions", &self.inner.subscriptions.len())
            .field("peers", &self.inner.peers.len())
            .finish()
    }
}

impl EngineInner {
    /// Gate for every public operation except `start`
    fn ensure_running(&self) -> PubSubResult<()> {
        if *self.run_state.read() != RunState::Running {
            return Err(PubSubError::NotRunning);
        }

        if !self.node_state.borrow().is_online() {
            self.stop("node is no longer online");
            return Err(PubSubError::NotRunning);
        }

        Ok(())
    }

    /// Register a peer connection and queue our interest set for it.
    /// Returns the connection's generation.
    fn register_peer(
        &self,
        peer: NodeId,
        outbound: &PeerSender,
        token: &CancellationToken,
    ) -> PubSubResult<u64> {
        let _guard = self.interest_lock.lock();
        let (generation, replaced) = self.peers.insert(peer, outbound.clone(), token.clone());

        if let Some(old) = replaced {
            debug!("Replacing existing connection to peer {}", peer);
            old.cancel.cancel();
        }

        // The engine may have stopped since the gate was checked
        if *self.run_state.read() != RunState::Running {
            if let Some(entry) = self.peers.remove_if_generation(&peer, generation) {
                entry.cancel.cancel();
            }
            return Err(PubSubError::NotRunning);
        }

        for topic in self.subscriptions.topics() {
            self.announce_to(&peer, outbound, &topic, true);
        }

        Ok(generation)
    }

    fn validate_topic(&self, topic: &str) -> PubSubResult<()> {
        if topic.is_empty() {
            return Err(PubSubError::InvalidTopic("topic must not be empty".to_string()));
        }

        if topic.len() > self.config.max_topic_length {
            return Err(PubSubError::InvalidTopic(format!(
                "topic is {} bytes, limit is {}",
                topic.len(),
                self.config.max_topic_length
            )));
        }

        Ok(())
    }

    /// Running -> Stopped. Returns whether this call made the transition.
    fn stop(&self, reason: &str) -> bool {
        {
            let mut run_state = self.run_state.write();
            if *run_state != RunState::Running {
                return false;
            }
            *run_state = RunState::Stopped;
        }

        self.cancellation_token.cancel();
        let closed = self.subscriptions.close_all();
        let peers = self.peers.drain();
        for (_, entry) in &peers {
            entry.cancel.cancel();
        }
        self.task_tracker.close();

        info!(
            "PubSub stopped for node {} ({}): closed {} subscriptions, dropped {} peers",
            self.local_node_id,
            reason,
            closed,
            peers.len()
        );
        true
    }

    /// Tell every connected peer about a change in our interest
    fn announce(&self, topic: &str, interested: bool) {
        for (peer, outbound) in self.peers.all_peers() {
            self.announce_to(&peer, &outbound, topic, interested);
        }
    }

    fn announce_to(&self, peer: &NodeId, outbound: &PeerSender, topic: &str, interested: bool) {
        let frame = Frame::Announce {
            topic: topic.to_string(),
            interested,
        };

        match encode_frame(&frame) {
            Ok(bytes) => {
                self.enqueue(peer, outbound, bytes);
            }
            Err(e) => warn!("Failed to encode announcement for '{}': {}", topic, e),
        }
    }

    fn enqueue(&self, peer: &NodeId, outbound: &PeerSender, frame: Bytes) -> bool {
        match outbound.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue for peer {} is full, dropping frame", peer);
                self.stats.write().outbound_dropped += 1;
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                trace!("Peer {} is gone, dropping frame", peer);
                false
            }
        }
    }

    fn deliver_locally(&self, topic: &str, payload: &Bytes) -> DeliveryReport {
        let report = self.subscriptions.deliver(topic, payload);

        if report.delivered > 0 || report.overflowed > 0 {
            let mut stats = self.stats.write();
            stats.messages_delivered += report.delivered as u64;
            stats.subscriber_overflows += report.overflowed as u64;
        }

        report
    }

    /// Queue a data frame for every peer interested in `topic`, except `exclude`
    fn forward(&self, topic: &str, frame: &Bytes, exclude: Option<&NodeId>) -> usize {
        let mut forwarded = 0;
        for (peer, outbound) in self.peers.interested_peers(topic, exclude) {
            if self.enqueue(&peer, &outbound, frame.clone()) {
                forwarded += 1;
            }
        }

        if forwarded > 0 {
            self.stats.write().frames_forwarded += forwarded as u64;
        }
        forwarded
    }

    fn handle_frame(&self, from: &NodeId, bytes: Bytes) {
        if *self.run_state.read() != RunState::Running {
            return;
        }

        let frame = match decode_frame(&bytes, self.config.max_frame_size) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping malformed frame from peer {}: {}", from, e);
                self.stats.write().malformed_dropped += 1;
                return;
            }
        };

        trace!("Received {} frame from peer {}", frame.kind(), from);

        match frame {
            Frame::Announce { topic, interested } => {
                if let Err(e) = self.validate_topic(&topic) {
                    warn!("Dropping announcement from peer {}: {}", from, e);
                    self.stats.write().malformed_dropped += 1;
                    return;
                }
                self.peers.record_interest(from, &topic, interested);
            }
            Frame::Data(message) => self.handle_data(from, message, bytes),
        }
    }

    /// The flood step
    fn handle_data(&self, from: &NodeId, message: Message, frame: Bytes) {
        if !message.has_valid_id() || self.validate_topic(message.topic()).is_err() {
            warn!("Dropping invalid message {:?} from peer {}", message.id(), from);
            self.stats.write().malformed_dropped += 1;
            return;
        }

        if message.publisher() == &self.local_node_id || !self.seen.mark_if_new(message.id()) {
            trace!("Dropping duplicate message {:?} from peer {}", message.id(), from);
            self.stats.write().duplicates_dropped += 1;
            return;
        }

        self.stats.write().messages_received += 1;

        let report = self.deliver_locally(message.topic(), message.payload());
        let forwarded = self.forward(message.topic(), &frame, Some(from));

        trace!(
            "Message {:?} on '{}' from peer {}: {} local, relayed to {} peers",
            message.id(),
            message.topic(),
            from,
            report.delivered,
            forwarded
        );
    }
}

/// Sequence base for a new engine.
///
/// Seeded from the wall clock so ids from a restarted node never collide with
/// ids its peers still remember from the previous run.
fn initial_seq() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}

impl Unsubscriber for EngineInner {
    fn cancel_subscription(&self, id: SubscriptionId) {
        let _guard = self.interest_lock.lock();
        let Some((topic, last)) = self.subscriptions.remove(id) else {
            return;
        };

        debug!("Local subscription {} for topic '{}' cancelled", id, topic);
        if last && *self.run_state.read() == RunState::Running {
            self.announce(&topic, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::NodeStateHandle;
    use crate::message::make_id;

    use assert_matches::assert_matches;

    fn engine(state: &NodeStateHandle) -> PubSub {
        PubSub::new(NodeId::from_seed(1), PubSubConfig::default(), state.subscribe())
    }

    #[tokio::test]
    async fn test_start_requires_online_node() {
        let state = NodeStateHandle::new(NodeState::Offline);
        let pubsub = engine(&state);

        assert_matches!(pubsub.start(), Err(PubSubError::NotOnline));
        assert_eq!(pubsub.run_state(), RunState::Uninitialized);

        state.set(NodeState::Started);
        pubsub.start().unwrap();
        assert!(pubsub.is_running());
        assert_matches!(pubsub.start(), Err(PubSubError::AlreadyStarted));

        pubsub.shutdown().await;
        assert_eq!(pubsub.run_state(), RunState::Stopped);
        assert_matches!(pubsub.start(), Err(PubSubError::NotRunning));
    }

    #[tokio::test]
    async fn test_gated_operations_before_start() {
        let state = NodeStateHandle::new(NodeState::Started);
        let pubsub = engine(&state);

        assert_matches!(pubsub.subscribe("t"), Err(PubSubError::NotRunning));
        assert_matches!(pubsub.unsubscribe("t"), Err(PubSubError::NotRunning));
        assert_matches!(pubsub.publish("t", "x"), Err(PubSubError::NotRunning));
        assert_matches!(pubsub.get_subscriptions(), Err(PubSubError::NotRunning));
        assert!(pubsub.inner.subscriptions.is_empty());
    }

    #[tokio::test]
    async fn test_publish_sequence_numbers_increase() {
        let state = NodeStateHandle::new(NodeState::Started);
        let pubsub = engine(&state);
        pubsub.start().unwrap();

        let base = pubsub.inner.last_seq.load(Ordering::Relaxed);
        assert!(base > 0, "sequence base should come from the clock");

        let first = pubsub.publish("t", "a").unwrap();
        let second = pubsub.publish("t", "a").unwrap();
        assert_eq!(first, make_id(pubsub.local_node_id(), base + 1));
        assert_eq!(second, make_id(pubsub.local_node_id(), base + 2));
        assert_eq!(pubsub.inner.seen.len(), 2);
        assert_eq!(pubsub.stats().messages_published, 2);

        pubsub.shutdown().await;
    }

    #[tokio::test]
    async fn test_restarted_engine_does_not_reuse_sequence_numbers() {
        let state = NodeStateHandle::new(NodeState::Started);

        let first_run = engine(&state);
        first_run.start().unwrap();
        let before_restart = first_run.publish("t", "a").unwrap();
        first_run.shutdown().await;

        let second_run = engine(&state);
        second_run.start().unwrap();
        let after_restart = second_run.publish("t", "a").unwrap();
        assert_ne!(before_restart, after_restart);
        assert!(
            second_run.inner.last_seq.load(Ordering::Relaxed)
                > first_run.inner.last_seq.load(Ordering::Relaxed)
        );

        second_run.shutdown().await;
    }

    #[tokio::test]
    async fn test_peer_not_registered_after_stop() {
        let state = NodeStateHandle::new(NodeState::Started);
        let pubsub = engine(&state);
        pubsub.start().unwrap();
        let _subscription = pubsub.subscribe("t").unwrap();

        // Stop lands after the gate in on_peer_connected has already passed
        assert!(pubsub.inner.stop("test"));

        let (outbound, queued) = flume::bounded(8);
        let token = pubsub.inner.cancellation_token.child_token();
        assert_matches!(
            pubsub.inner.register_peer(NodeId::from_seed(2), &outbound, &token),
            Err(PubSubError::NotRunning)
        );
        assert!(pubsub.peers().is_empty());
        assert!(token.is_cancelled());
        assert!(queued.is_empty());

        pubsub.shutdown().await;
    }

    #[tokio::test]
    async fn test_topic_length_limit() {
        let state = NodeStateHandle::new(NodeState::Started);
        let pubsub = PubSub::new(
            NodeId::from_seed(1),
            PubSubConfig {
                max_topic_length: 4,
                ..PubSubConfig::default()
            },
            state.subscribe(),
        );
        pubsub.start().unwrap();

        assert!(pubsub.subscribe("abcd").is_ok());
        assert_matches!(pubsub.subscribe("abcde"), Err(PubSubError::InvalidTopic(_)));

        pubsub.shutdown().await;
    }

    #[tokio::test]
    async fn test_payload_size_limit() {
        let state = NodeStateHandle::new(NodeState::Started);
        let pubsub = PubSub::new(
            NodeId::from_seed(1),
            PubSubConfig {
                max_payload_size: 4,
                ..PubSubConfig::default()
            },
            state.subscribe(),
        );
        pubsub.start().unwrap();

        assert!(pubsub.publish("t", "1234").is_ok());
        assert_matches!(
            pubsub.publish("t", "12345"),
            Err(PubSubError::PayloadTooLarge { size: 5, max: 4 })
        );

        pubsub.shutdown().await;
    }
}
