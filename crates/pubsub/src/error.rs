//! Error types for the pubsub engine

use proven_transport::TransportError;
use thiserror::Error;

/// PubSub operation errors
///
/// Precondition violations are returned to the caller as-is and are never
/// retried by the engine.
#[derive(Debug, Error)]
pub enum PubSubError {
    /// `start` was called while the node is not online
    #[error("Node is not online")]
    NotOnline,

    /// A gated operation was called before `start` or after the engine stopped
    #[error("PubSub engine is not running")]
    NotRunning,

    /// `start` was called on an engine that is already running
    #[error("PubSub engine is already started")]
    AlreadyStarted,

    /// Topic was empty or otherwise unusable
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Publish was called without a payload
    #[error("Missing payload")]
    MissingPayload,

    /// Payload exceeds the configured limit
    #[error("Payload of {size} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge {
        /// Size of the rejected payload
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// Frame encoding or decoding failed
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Wire codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    /// Serialization failed
    #[error("Failed to encode frame: {0}")]
    Encode(String),

    /// Deserialization failed
    #[error("Failed to decode frame: {0}")]
    Decode(String),

    /// Frame exceeds the configured limit
    #[error("Frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Size of the offending frame
        size: usize,
        /// Configured limit
        max: usize,
    },
}

/// Result type alias
pub type PubSubResult<T> = Result<T, PubSubError>;
