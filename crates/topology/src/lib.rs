//! Node identity for Proven Network
//!
//! This crate provides the `NodeId` type used to name peers on the wire and
//! to attribute published messages to their origin.

pub mod error;
pub mod node_id;

pub use error::TopologyError;
pub use node_id::NodeId;
