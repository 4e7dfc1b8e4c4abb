//! Baler - framed buffering and shipping for log streams
//!
//! Baler packs a continuous stream of log-line writes, keyed by stream
//! identity, into fixed-capacity framed blocks. Full frames rotate out under
//! monotonically increasing ids, a drain operation hands every completed frame
//! to the shipping transport in id order, and frames accepted but not yet
//! shipped survive process restarts through a crash-safe durable directory.
//! A shard-routing layer fans writes out across backend instances by the shard
//! number derived from each stream's file path.
//!
//! # Examples
//!
//! ```ignore
//! use baler_rs::{FrameRegistry, RegistryConfig, StreamId};
//!
//! let registry = FrameRegistry::open(RegistryConfig::new("/var/lib/baler"))?;
//! let stream = StreamId::new("web-01", "/var/log/app.log", "app", 0, 1);
//!
//! registry.put(&stream, 1, b"GET /healthz 200\n")?;
//!
//! // The shipping transport drains completed frames in id order
//! registry.for_each_ready_data(|frame| {
//!     send_to_collector(frame.data());
//! })?;
//!
//! registry.close()?;
//! ```

pub mod config;
pub mod durable;
pub mod error;
pub mod frame;
pub mod ids;
pub mod metrics;
pub mod registry;
pub mod shard;
pub mod stream;

pub use config::{CapacityRule, CapacityTable, RegistryConfig};
pub use durable::DurableStore;
pub use error::{Error, Result};
pub use frame::Frame;
pub use ids::{IdAllocator, SequentialIdAllocator};
pub use metrics::MetricsCollector;
pub use registry::{FrameRegistry, RegistryStats};
pub use shard::{
    AvailabilityReport, AvailabilityState, BufferedBackend, RouterFailureListener, ShardBackend,
    ShardMapper, ShardRange, ShardResolver, ShardRouter,
};
pub use stream::StreamId;
