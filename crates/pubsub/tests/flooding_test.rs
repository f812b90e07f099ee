//! Multi node flooding over the in-memory transport

use std::time::Duration;

use bytes::Bytes;
use proven_pubsub::codec::{decode_frame, encode_frame};
use proven_pubsub::{Frame, Message, NodeState, NodeStateHandle, PubSub, PubSubConfig};
use proven_topology::NodeId;
use proven_transport::Connection;
use proven_transport_memory::{MemoryConnection, MemoryTransport};
use tokio::time::{sleep, timeout};

struct TestNode {
    id: NodeId,
    _state: NodeStateHandle,
    pubsub: PubSub,
}

impl TestNode {
    fn start(seed: u8) -> Self {
        let id = NodeId::from_seed(seed);
        let state = NodeStateHandle::new(NodeState::Started);
        let pubsub = PubSub::new(id, PubSubConfig::default(), state.subscribe());
        pubsub.start().expect("Failed to start pubsub");

        Self {
            id,
            _state: state,
            pubsub,
        }
    }
}

fn connect(a: &TestNode, b: &TestNode) {
    let (a_end, b_end) = MemoryTransport::default().pair();
    a.pubsub.on_peer_connected(b.id, a_end).unwrap();
    b.pubsub.on_peer_connected(a.id, b_end).unwrap();
}

/// Attach a hand driven peer to `node`
fn connect_raw(node: &TestNode, raw_id: NodeId) -> MemoryConnection {
    let (node_end, raw_end) = MemoryTransport::default().pair();
    node.pubsub.on_peer_connected(raw_id, node_end).unwrap();
    raw_end
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timed out waiting for {what}"));
}

async fn wait_for_interest(node: &TestNode, peer: &TestNode, topic: &str) {
    wait_until(&format!("{} to see {} interested in '{topic}'", node.id, peer.id), || {
        node.pubsub
            .peer_topics(&peer.id)
            .is_some_and(|topics| topics.contains(topic))
    })
    .await;
}

async fn recv_frame(connection: &MemoryConnection) -> Frame {
    let bytes = timeout(Duration::from_secs(1), connection.recv())
        .await
        .expect("Timed out waiting for frame")
        .expect("Connection closed");
    decode_frame(&bytes, usize::MAX).expect("Failed to decode frame")
}

#[tokio::test]
async fn test_line_relay_delivers_exactly_once() {
    let _ = tracing_subscriber::fmt::try_init();

    let a = TestNode::start(1);
    let b = TestNode::start(2);
    let c = TestNode::start(3);
    connect(&a, &b);
    connect(&b, &c);

    let at_b = b.pubsub.subscribe("t").unwrap();
    let at_c = c.pubsub.subscribe("t").unwrap();
    wait_for_interest(&a, &b, "t").await;
    wait_for_interest(&b, &c, "t").await;

    a.pubsub.publish("t", "x").unwrap();

    let payload = timeout(Duration::from_secs(1), at_c.recv())
        .await
        .expect("Message never reached C");
    assert_eq!(payload, Some(Bytes::from("x")));
    assert_eq!(at_b.recv().await, Some(Bytes::from("x")));

    // Give any stray duplicate time to arrive
    sleep(Duration::from_millis(100)).await;
    assert_eq!(at_b.try_recv(), None);
    assert_eq!(at_c.try_recv(), None);

    assert_eq!(b.pubsub.stats().messages_received, 1);
    assert_eq!(c.pubsub.stats().messages_received, 1);

    for node in [&a, &b, &c] {
        node.pubsub.shutdown().await;
    }
}

#[tokio::test]
async fn test_triangle_suppresses_duplicates() {
    let _ = tracing_subscriber::fmt::try_init();

    let a = TestNode::start(1);
    let b = TestNode::start(2);
    let c = TestNode::start(3);
    connect(&a, &b);
    connect(&b, &c);
    connect(&a, &c);

    let at_a = a.pubsub.subscribe("t").unwrap();
    let at_b = b.pubsub.subscribe("t").unwrap();
    let at_c = c.pubsub.subscribe("t").unwrap();
    wait_for_interest(&a, &b, "t").await;
    wait_for_interest(&a, &c, "t").await;
    wait_for_interest(&b, &a, "t").await;
    wait_for_interest(&b, &c, "t").await;
    wait_for_interest(&c, &a, "t").await;
    wait_for_interest(&c, &b, "t").await;

    a.pubsub.publish("t", "once").unwrap();

    assert_eq!(at_b.recv().await, Some(Bytes::from("once")));
    assert_eq!(at_c.recv().await, Some(Bytes::from("once")));
    assert_eq!(at_a.try_recv(), Some(Bytes::from("once")));

    wait_until("both relays to drop the echo", || {
        b.pubsub.stats().duplicates_dropped + c.pubsub.stats().duplicates_dropped >= 2
    })
    .await;

    assert_eq!(at_a.try_recv(), None);
    assert_eq!(at_b.try_recv(), None);
    assert_eq!(at_c.try_recv(), None);

    for node in [&a, &b, &c] {
        node.pubsub.shutdown().await;
    }
}

#[tokio::test]
async fn test_duplicate_frame_delivered_and_forwarded_once() {
    let _ = tracing_subscriber::fmt::try_init();

    let b = TestNode::start(2);
    let c = TestNode::start(3);
    connect(&b, &c);

    let raw_id = NodeId::from_seed(1);
    let raw = connect_raw(&b, raw_id);

    let at_b = b.pubsub.subscribe("t").unwrap();
    let at_c = c.pubsub.subscribe("t").unwrap();
    wait_for_interest(&b, &c, "t").await;

    // B advertises its interest to the new peer
    assert_eq!(
        recv_frame(&raw).await,
        Frame::Announce {
            topic: "t".to_string(),
            interested: true,
        }
    );

    // The sender is interested too, so only the sender rule keeps the relay away
    let announce = encode_frame(&Frame::Announce {
        topic: "t".to_string(),
        interested: true,
    })
    .unwrap();
    raw.send(announce).await.unwrap();
    wait_until("B to see the raw peer interested in 't'", || {
        b.pubsub
            .peer_topics(&raw_id)
            .is_some_and(|topics| topics.contains("t"))
    })
    .await;

    let frame = encode_frame(&Frame::Data(Message::new(raw_id, 1, "t", Bytes::from("dup")))).unwrap();
    raw.send(frame.clone()).await.unwrap();
    raw.send(frame).await.unwrap();

    assert_eq!(at_b.recv().await, Some(Bytes::from("dup")));
    assert_eq!(at_c.recv().await, Some(Bytes::from("dup")));

    wait_until("B to drop the second copy", || {
        b.pubsub.stats().duplicates_dropped == 1
    })
    .await;
    sleep(Duration::from_millis(50)).await;

    assert_eq!(at_b.try_recv(), None);
    assert_eq!(at_c.try_recv(), None);
    assert_eq!(b.pubsub.stats().frames_forwarded, 1);

    // The sender never gets its own message back
    assert!(
        timeout(Duration::from_millis(100), raw.recv()).await.is_err(),
        "Frame echoed back to its sender"
    );

    b.pubsub.shutdown().await;
    c.pubsub.shutdown().await;
}

#[tokio::test]
async fn test_restarted_publisher_still_reaches_peers() {
    let _ = tracing_subscriber::fmt::try_init();

    let b = TestNode::start(2);
    let at_b = b.pubsub.subscribe("t").unwrap();

    let first_run = TestNode::start(1);
    connect(&first_run, &b);
    wait_for_interest(&first_run, &b, "t").await;
    first_run.pubsub.publish("t", "first").unwrap();
    assert_eq!(at_b.recv().await, Some(Bytes::from("first")));
    first_run.pubsub.shutdown().await;
    wait_until("B to drop the first run", || b.pubsub.peers().is_empty()).await;

    // Same identity, fresh engine
    let second_run = TestNode::start(1);
    connect(&second_run, &b);
    wait_for_interest(&second_run, &b, "t").await;
    second_run.pubsub.publish("t", "second").unwrap();

    let payload = timeout(Duration::from_secs(1), at_b.recv())
        .await
        .expect("Message from restarted publisher was dropped");
    assert_eq!(payload, Some(Bytes::from("second")));
    assert_eq!(b.pubsub.stats().duplicates_dropped, 0);

    second_run.pubsub.shutdown().await;
    b.pubsub.shutdown().await;
}

#[tokio::test]
async fn test_publish_before_shutdown_is_delivered() {
    let _ = tracing_subscriber::fmt::try_init();

    let a = TestNode::start(1);
    let b = TestNode::start(2);
    connect(&a, &b);

    let at_b = b.pubsub.subscribe("t").unwrap();
    wait_for_interest(&a, &b, "t").await;

    a.pubsub.publish("t", "in-flight").unwrap();
    a.pubsub.shutdown().await;

    let payload = timeout(Duration::from_secs(1), at_b.recv())
        .await
        .expect("Queued frame lost on shutdown");
    assert_eq!(payload, Some(Bytes::from("in-flight")));

    b.pubsub.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frame_does_not_stop_reader() {
    let _ = tracing_subscriber::fmt::try_init();

    let node = TestNode::start(2);
    let raw_id = NodeId::from_seed(1);
    let raw = connect_raw(&node, raw_id);
    let subscription = node.pubsub.subscribe("t").unwrap();

    raw.send(Bytes::from_static(b"\xff\x00not cbor")).await.unwrap();
    let frame = encode_frame(&Frame::Data(Message::new(raw_id, 7, "t", Bytes::from("ok")))).unwrap();
    raw.send(frame).await.unwrap();

    let payload = timeout(Duration::from_secs(1), subscription.recv())
        .await
        .expect("Reader stopped after malformed frame");
    assert_eq!(payload, Some(Bytes::from("ok")));
    assert_eq!(node.pubsub.stats().malformed_dropped, 1);
    assert_eq!(node.pubsub.peers(), vec![raw_id]);

    node.pubsub.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_removes_peer_interest() {
    let _ = tracing_subscriber::fmt::try_init();

    let a = TestNode::start(1);
    let b = TestNode::start(2);
    connect(&a, &b);

    let _at_b = b.pubsub.subscribe("t").unwrap();
    wait_for_interest(&a, &b, "t").await;

    assert!(a.pubsub.on_peer_disconnected(&b.id));
    assert!(!a.pubsub.on_peer_disconnected(&b.id));
    assert_eq!(a.pubsub.peer_topics(&b.id), None);

    a.pubsub.publish("t", "nobody").unwrap();
    assert_eq!(a.pubsub.stats().frames_forwarded, 0);

    // B notices the link went away
    wait_until("B to drop A", || b.pubsub.peers().is_empty()).await;

    a.pubsub.shutdown().await;
    b.pubsub.shutdown().await;
}

#[tokio::test]
async fn test_unsubscribe_is_announced() {
    let _ = tracing_subscriber::fmt::try_init();

    let a = TestNode::start(1);
    let b = TestNode::start(2);
    connect(&a, &b);

    let first = b.pubsub.subscribe("t").unwrap();
    let second = b.pubsub.subscribe("t").unwrap();
    wait_for_interest(&a, &b, "t").await;

    // Interest stays while any local subscription remains
    first.cancel();
    sleep(Duration::from_millis(50)).await;
    assert!(a.pubsub.peer_topics(&b.id).unwrap().contains("t"));

    drop(second);
    wait_until("A to forget B's interest", || {
        a.pubsub
            .peer_topics(&b.id)
            .is_some_and(|topics| topics.is_empty())
    })
    .await;

    a.pubsub.shutdown().await;
    b.pubsub.shutdown().await;
}

#[tokio::test]
async fn test_peer_shutdown_disconnects() {
    let _ = tracing_subscriber::fmt::try_init();

    let a = TestNode::start(1);
    let b = TestNode::start(2);
    connect(&a, &b);
    assert_eq!(a.pubsub.peers(), vec![b.id]);

    b.pubsub.shutdown().await;

    wait_until("A to notice B is gone", || a.pubsub.peers().is_empty()).await;
    a.pubsub.shutdown().await;
}

#[tokio::test]
async fn test_existing_interest_sent_on_connect() {
    let _ = tracing_subscriber::fmt::try_init();

    let a = TestNode::start(1);
    let b = TestNode::start(2);
    let _news = b.pubsub.subscribe("news").unwrap();
    let _sports = b.pubsub.subscribe("sports").unwrap();

    connect(&a, &b);
    wait_for_interest(&a, &b, "news").await;
    wait_for_interest(&a, &b, "sports").await;

    a.pubsub.shutdown().await;
    b.pubsub.shutdown().await;
}
