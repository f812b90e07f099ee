//! In-memory transport implementation for testing
//!
//! This transport wires nodes together within the same process, perfect for
//! testing and simulating small meshes. There is no global registry: every
//! call to [`MemoryTransport::pair`] returns both ends of a fresh link.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use proven_transport::{Config, Connection, TransportError};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Memory transport implementation
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    config: Config,
}

impl MemoryTransport {
    /// Create a new memory transport with the given config
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Create both ends of a new bidirectional link
    pub fn pair(&self) -> (MemoryConnection, MemoryConnection) {
        let (a_to_b_tx, a_to_b_rx) = flume::bounded(self.config.buffer_size);
        let (b_to_a_tx, b_to_a_rx) = flume::bounded(self.config.buffer_size);

        let link_id = Uuid::new_v4();
        let shutdown = CancellationToken::new();

        let a = MemoryConnection {
            id: link_id,
            sender: a_to_b_tx,
            receiver: b_to_a_rx,
            shutdown: shutdown.clone(),
            closed: Arc::new(AtomicBool::new(false)),
            max_frame_size: self.config.max_frame_size,
        };

        let b = MemoryConnection {
            id: link_id,
            sender: b_to_a_tx,
            receiver: a_to_b_rx,
            shutdown,
            closed: Arc::new(AtomicBool::new(false)),
            max_frame_size: self.config.max_frame_size,
        };

        debug!("Memory link {} created", link_id);

        (a, b)
    }
}

/// One end of an in-memory link
pub struct MemoryConnection {
    id: Uuid,
    sender: flume::Sender<Bytes>,
    receiver: flume::Receiver<Bytes>,
    /// Shared by both ends so closing either side wakes the other
    shutdown: CancellationToken,
    closed: Arc<AtomicBool>,
    max_frame_size: usize,
}

impl MemoryConnection {
    /// Identifier shared by both ends of the link
    pub fn link_id(&self) -> Uuid {
        self.id
    }
}

impl Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("id", &self.id)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }

        if frame.len() > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: frame.len(),
                max: self.max_frame_size,
            });
        }

        tokio::select! {
            result = self.sender.send_async(frame) => {
                result.map_err(|_| TransportError::ConnectionClosed)
            }
            () = self.shutdown.cancelled() => Err(TransportError::ConnectionClosed),
        }
    }

    async fn recv(&self) -> Result<Bytes, TransportError> {
        // Frames buffered before the link closed are still handed out
        tokio::select! {
            biased;
            result = self.receiver.recv_async() => match result {
                Ok(frame) => Ok(frame),
                Err(_) => {
                    self.closed.store(true, Ordering::Release);
                    Err(TransportError::ConnectionClosed)
                }
            },
            () = self.shutdown.cancelled() => self
                .receiver
                .try_recv()
                .map_err(|_| TransportError::ConnectionClosed),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        debug!("Closing memory link {}", self.id);
        self.closed.store(true, Ordering::Release);
        self.shutdown.cancel();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.shutdown.is_cancelled()
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        // Dropping either end tears the link down for the other side too
        self.shutdown.cancel();
    }
}
