//! Simple error types for node identity operations

use thiserror::Error as ThisError;

/// Topology-related errors
#[derive(Clone, Debug, ThisError)]
pub enum TopologyError {
    /// The bytes did not form a valid ed25519 public key
    #[error("Invalid node key: {0}")]
    InvalidKey(String),

    /// The hex representation could not be decoded
    #[error("Invalid node id encoding: {0}")]
    InvalidEncoding(String),
}
