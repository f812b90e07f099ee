//! Node and engine lifecycle state
//!
//! The node state is owned by whoever runs the node's transport; the engine
//! only holds a receiver and consults it on `start` and on every gated call.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Externally owned state of the node the engine runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Transport is not online
    Offline,
    /// Transport is online
    Started,
    /// Node has been shut down
    Stopped,
}

impl NodeState {
    /// Whether the engine may run on a node in this state
    pub fn is_online(self) -> bool {
        self == Self::Started
    }
}

/// Owner side of the node state signal
#[derive(Debug)]
pub struct NodeStateHandle {
    sender: watch::Sender<NodeState>,
}

impl NodeStateHandle {
    /// Create a new handle with an initial state
    pub fn new(initial: NodeState) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Publish a new node state to all observers
    pub fn set(&self, state: NodeState) {
        let previous = self.sender.send_replace(state);
        if previous != state {
            tracing::debug!("Node state changed from {:?} to {:?}", previous, state);
        }
    }

    /// Current node state
    pub fn state(&self) -> NodeState {
        *self.sender.borrow()
    }

    /// Get a receiver that observes this node's state
    pub fn subscribe(&self) -> watch::Receiver<NodeState> {
        self.sender.subscribe()
    }
}

impl Default for NodeStateHandle {
    fn default() -> Self {
        Self::new(NodeState::Offline)
    }
}

/// Run state of a single engine instance
///
/// Only `Uninitialized -> Running` and `Running -> Stopped` are valid;
/// `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Created but not started
    Uninitialized,
    /// Accepting operations
    Running,
    /// Shut down, all gated operations fail
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
