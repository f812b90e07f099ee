//! Error types for transports

use thiserror::Error;

/// Transport layer errors
#[derive(Clone, Debug, Error)]
pub enum TransportError {
    /// The connection was closed by either side
    #[error("Connection closed")]
    ConnectionClosed,

    /// A frame could not be handed to the underlying connection
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// A frame exceeded the configured maximum size
    #[error("Frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Size of the offending frame
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// Generic error
    #[error("{0}")]
    Other(String),
}
