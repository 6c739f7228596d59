//! Redis pub/sub plumbing between players' front ends and the coordinator.

pub mod broker;
pub mod inbound;
pub mod presence;
pub mod retry;

pub use broker::{OutboundEnvelope, RedisNotifier};
pub use inbound::{spawn_subscriber, InboundEvent, INBOUND_CHANNEL};
pub use presence::RedisPresence;
