//! Flooding publish/subscribe over peer connections
//!
//! This crate provides a topic based pubsub engine where:
//! - Local subscriptions are advertised to every connected peer
//! - Published messages are flooded to interested peers and relayed on
//! - A seen cache keyed by message id stops every loop
//! - Transports are pluggable through `proven_transport::Connection`
#![warn(clippy::all)]

pub mod codec;
pub mod config;
/// The pubsub engine
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod message;
pub mod peers;
pub mod seen;
pub mod stats;
/// Local subscriptions and their handles
pub mod subscription;

pub use config::PubSubConfig;
pub use engine::PubSub;
pub use error::{CodecError, PubSubError, PubSubResult};
pub use lifecycle::{NodeState, NodeStateHandle, RunState};
pub use message::{Frame, Message, MessageId, make_id};
pub use seen::SeenCache;
pub use stats::PubSubStats;
pub use subscription::{DeliveryReport, Subscription, SubscriptionEntry, SubscriptionId};
