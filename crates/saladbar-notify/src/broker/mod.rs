//! Broker client.
//!
//! The broker is an NNG fan-out: publishers PUSH channel-tagged frames to the
//! relay's ingress, and the relay re-publishes them on its PUB egress, where
//! every connection's subscriber handle filters by channel topic.
//!
//! - [`BrokerPool`] is created once at startup and shared by all connections.
//!   Building it is the startup connectivity check.
//! - [`Subscriber`] is one connection's handle: it registers and unregisters
//!   channels and polls for pending events without blocking.
//! - [`Relay`] is the broker itself, which can run inside this process.

mod pool;
mod relay;
mod subscriber;

pub use pool::{BrokerPool, PoolConfig, PoolStats, SharedBrokerPool};
pub use relay::Relay;
pub use subscriber::Subscriber;
