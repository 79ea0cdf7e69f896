//! # Relay State
//!
//! Process-wide shared state of the relay: the TTL solution cache and the
//! solver subscription registry.

pub mod cache;
pub mod connection;
pub mod subscription;

pub use cache::{SolutionCache, DEFAULT_TTL};
pub use connection::ConnectionHandle;
pub use subscription::{OwnerId, Subscription, SubscriptionRegistry, NOTIFICATION_QUEUE_CAPACITY};
