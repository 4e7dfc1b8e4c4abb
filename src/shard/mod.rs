//! Shard-based routing of log writes
//!
//! This module fans a single logical write out to one of N backend instances.
//! A shard number is derived from the stream's file path, each backend owns a
//! contiguous range of shard numbers, and the router validates at construction
//! that every shard in `[0, max_shard]` has an owner.

mod backend;
mod mapper;
mod router;

pub use backend::{AvailabilityReport, AvailabilityState, BufferedBackend, ShardBackend};
pub use mapper::{ShardMapper, ShardResolver, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
pub use router::{RouterFailureListener, ShardRange, ShardRouter};
