//! Redis Streams event bus with distributed locking.
//!
//! This crate provides the messaging and coordination primitives of the
//! pipeline:
//! - [`EventBus`]: partitioned, ordered-per-key processing channel plus a
//!   dead-letter channel, with a synchronous DLQ redirect on publish failure
//! - [`DistributedLock`]: per-video exclusive lock with TTL and a
//!   configurable fail-open policy
//! - [`StatusCache`]: best-effort mirror of the persisted video status

pub mod bus;
pub mod cache;
pub mod config;
pub mod error;
pub mod lock;

pub use bus::{partition_for, partition_stream, Delivery, EventBus, PublishOutcome};
pub use cache::{NullCache, RedisStatusCache, StatusCache};
pub use config::BusConfig;
pub use error::{BusError, BusResult};
pub use lock::{DistributedLock, InMemoryLock, LockConfig, RedisLock};
