//! Generic transport abstraction for peer communication
//!
//! This crate provides the transport-agnostic interface the pubsub engine
//! talks to. A transport hands the engine one duplex [`Connection`] per
//! connected peer; concrete transports live in separate crates.
//!
//! Connections handle:
//! - Ordered delivery of opaque frames in both directions
//! - Reporting closure by either side

pub mod error;

use async_trait::async_trait;
use bytes::Bytes;

pub use error::TransportError;
pub use error::TransportError as Error;

/// A duplex, ordered frame stream to a single peer
///
/// Frames sent on one end arrive in order at the other end. Both `send` and
/// `recv` may be called concurrently from different tasks.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Send a frame to the peer
    async fn send(&self, frame: Bytes) -> Result<(), TransportError>;

    /// Receive the next frame from the peer
    ///
    /// Returns `TransportError::ConnectionClosed` once the peer has gone away
    /// and all buffered frames have been drained.
    async fn recv(&self) -> Result<Bytes, TransportError>;

    /// Close the connection
    async fn close(&self) -> Result<(), TransportError>;

    /// Whether the connection has been closed locally
    fn is_closed(&self) -> bool;
}

/// Configuration for transports
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum frame size in bytes
    pub max_frame_size: usize,
    /// Frames buffered per direction before `send` waits
    pub buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_frame_size: 2 * 1024 * 1024, // 2MB
            buffer_size: 100,
        }
    }
}
