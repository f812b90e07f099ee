//! Node ID type

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use ed25519_dalek::{PUBLIC_KEY_LENGTH, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::TopologyError;

/// Identity of a node, backed by its ed25519 public key
#[derive(Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub struct NodeId(VerifyingKey);

impl NodeId {
    /// Create a node ID from a verifying key
    pub fn new(public_key: VerifyingKey) -> Self {
        Self(public_key)
    }

    /// Deterministically derive a node ID from a seed byte.
    ///
    /// Intended for tests and local simulations where stable identities are
    /// more useful than real keys.
    pub fn from_seed(seed: u8) -> Self {
        let mut key_bytes = [0u8; 32];
        key_bytes[0] = seed;
        let signing_key = SigningKey::from_bytes(&key_bytes);
        Self(signing_key.verifying_key())
    }

    /// Parse a node ID from raw public key bytes
    pub fn from_bytes(bytes: &[u8; PUBLIC_KEY_LENGTH]) -> Result<Self, TopologyError> {
        VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|e| TopologyError::InvalidKey(e.to_string()))
    }

    /// Get the underlying verifying key
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.0
    }

    /// Raw public key bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        self.0.as_bytes()
    }

    /// Hex encoded public key
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl Hash for NodeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full keys make logs unreadable
        write!(f, "NodeId({})", &self.to_hex()[..16])
    }
}

impl FromStr for NodeId {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| TopologyError::InvalidEncoding(e.to_string()))?;
        let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|v: Vec<u8>| {
            TopologyError::InvalidEncoding(format!("expected 32 bytes, got {}", v.len()))
        })?;
        Self::from_bytes(&bytes)
    }
}

impl From<VerifyingKey> for NodeId {
    fn from(public_key: VerifyingKey) -> Self {
        Self::new(public_key)
    }
}
