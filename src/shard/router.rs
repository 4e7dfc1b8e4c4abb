//! Routing of writes to shard-owning backends
//!
//! The router holds a dense shard-to-backend lookup table built from inclusive
//! ranges. Construction fails unless every shard in `[0, max_shard]` has an
//! owner, and that failure is broadcast to registered listeners so composed
//! systems can alert even when wiring aborts.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{error, info};

use crate::error::{Error, Result};
use crate::metrics::MetricsCollector;
use crate::shard::backend::{AvailabilityReport, AvailabilityState, ShardBackend};
use crate::shard::mapper::ShardResolver;
use crate::stream::StreamId;

/// Notified synchronously when router construction fails
pub trait RouterFailureListener: Send + Sync {
    /// Called with the construction error before it is returned
    fn on_construction_failure(&self, error: &Error);
}

/// An inclusive shard interval owned by one backend
#[derive(Clone)]
pub struct ShardRange {
    backend: Arc<dyn ShardBackend>,
    lower: u32,
    upper: u32,
}

impl ShardRange {
    /// Create a range; the bounds are inclusive and must not be inverted
    pub fn new(backend: Arc<dyn ShardBackend>, lower: u32, upper: u32) -> Result<Self> {
        if lower > upper {
            return Err(Error::config(format!(
                "shard range for backend '{}' is inverted: {} > {}",
                backend.name(),
                lower,
                upper
            )));
        }
        Ok(Self {
            backend,
            lower,
            upper,
        })
    }

    /// The backend owning this range
    pub fn backend(&self) -> &Arc<dyn ShardBackend> {
        &self.backend
    }

    /// First shard of the range
    pub fn lower(&self) -> u32 {
        self.lower
    }

    /// Last shard of the range
    pub fn upper(&self) -> u32 {
        self.upper
    }
}

impl fmt::Debug for ShardRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardRange")
            .field("backend", &self.backend.name())
            .field("lower", &self.lower)
            .field("upper", &self.upper)
            .finish()
    }
}

/// Routes each write to the backend owning its shard
pub struct ShardRouter {
    /// Dense lookup indexed by shard number, covering `[0, max_shard]`
    table: Vec<Arc<dyn ShardBackend>>,
    /// Distinct backends in declaration order, for availability queries
    backends: Vec<Arc<dyn ShardBackend>>,
    resolver: Arc<dyn ShardResolver>,
    metrics: Arc<MetricsCollector>,
}

impl ShardRouter {
    /// Build a router from shard ranges and a resolver
    pub fn new(ranges: Vec<ShardRange>, resolver: Arc<dyn ShardResolver>) -> Result<Self> {
        Self::with_parts(ranges, resolver, &[], Arc::new(MetricsCollector::new()))
    }

    /// Build a router with failure listeners and a metrics collector
    pub fn with_parts(
        ranges: Vec<ShardRange>,
        resolver: Arc<dyn ShardResolver>,
        listeners: &[Arc<dyn RouterFailureListener>],
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self> {
        match Self::build_table(&ranges) {
            Ok((table, backends)) => {
                info!(
                    backends = backends.len(),
                    shards = table.len(),
                    "shard router ready"
                );
                Ok(Self {
                    table,
                    backends,
                    resolver,
                    metrics,
                })
            }
            Err(err) => {
                for listener in listeners {
                    listener.on_construction_failure(&err);
                }
                error!(%err, "shard router construction failed");
                Err(err)
            }
        }
    }

    /// Route one write to the backend owning its shard.
    ///
    /// The resolver sees the stream's host name, file path, and the payload;
    /// the resolved shard must fall inside the configured ranges.
    pub fn log(&self, stream: &StreamId, protocol_version: u32, payload: &[u8]) -> Result<()> {
        let result = self
            .owning_backend(stream.host_name(), stream.file_path(), payload)
            .and_then(|backend| backend.log(stream, protocol_version, payload));

        match result {
            Ok(()) => {
                self.metrics.increment_routed_writes();
                Ok(())
            }
            Err(err) => {
                self.metrics.increment_routing_failures();
                Err(err)
            }
        }
    }

    /// Availability of every distinct backend, reduced to a composite state.
    ///
    /// The reduction runs over backend instances, so two backends sharing a
    /// name both count; the report's name-keyed view keeps one entry per name.
    pub fn availability_report(&self) -> AvailabilityReport {
        let mut states = Vec::with_capacity(self.backends.len());
        let mut named = HashMap::with_capacity(self.backends.len());
        for backend in &self.backends {
            let state = backend.availability();
            states.push(state);
            named.insert(backend.name().to_string(), state);
        }
        AvailabilityReport::from_instance_states(&states, named)
    }

    /// Whether every distinct backend currently accepts writes
    pub fn is_logging_available(&self) -> bool {
        self.backends
            .iter()
            .all(|backend| backend.availability() == AvailabilityState::Operational)
    }

    /// Whether the one backend owning this file's shard accepts writes
    pub fn is_stream_available(&self, host_name: &str, file_path: &str) -> Result<bool> {
        let backend = self.owning_backend(host_name, file_path, &[])?;
        Ok(backend.availability() == AvailabilityState::Operational)
    }

    /// Number of distinct backends behind the router
    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    /// Highest shard number the table covers
    pub fn max_shard(&self) -> u32 {
        (self.table.len() - 1) as u32
    }

    // Internal methods

    fn owning_backend(
        &self,
        host_name: &str,
        file_path: &str,
        payload: &[u8],
    ) -> Result<&Arc<dyn ShardBackend>> {
        let shard = self.resolver.resolve(host_name, file_path, payload)?;
        self.table.get(shard as usize).ok_or_else(|| {
            Error::routing(format!(
                "shard {} for '{}' is outside the configured ranges (max shard {})",
                shard,
                file_path,
                self.max_shard()
            ))
        })
    }

    /// Apply the ranges in declaration order (last write wins on overlap) and
    /// verify that no shard in `[0, max_shard]` is left unowned.
    fn build_table(
        ranges: &[ShardRange],
    ) -> Result<(Vec<Arc<dyn ShardBackend>>, Vec<Arc<dyn ShardBackend>>)> {
        if ranges.is_empty() {
            return Err(Error::routing("no shard ranges configured"));
        }

        let max_shard = ranges.iter().map(|r| r.upper).max().unwrap_or(0);
        let mut slots: Vec<Option<Arc<dyn ShardBackend>>> = vec![None; max_shard as usize + 1];
        for range in ranges {
            for shard in range.lower..=range.upper {
                slots[shard as usize] = Some(Arc::clone(&range.backend));
            }
        }

        let uncovered = Self::uncovered_spans(&slots);
        if !uncovered.is_empty() {
            return Err(Error::routing(format!(
                "no backend configured for shards {}",
                uncovered.join(", ")
            )));
        }

        // Distinct backends by identity; one instance may own several ranges
        let mut backends: Vec<Arc<dyn ShardBackend>> = Vec::new();
        for range in ranges {
            if !backends.iter().any(|known| Arc::ptr_eq(known, &range.backend)) {
                backends.push(Arc::clone(&range.backend));
            }
        }

        let table: Vec<Arc<dyn ShardBackend>> = slots.into_iter().flatten().collect();
        debug_assert_eq!(table.len(), max_shard as usize + 1);

        Ok((table, backends))
    }

    /// Collapse unowned slots into `a-b` span labels for the coverage error
    fn uncovered_spans(slots: &[Option<Arc<dyn ShardBackend>>]) -> Vec<String> {
        let mut spans = Vec::new();
        let mut open_span: Option<usize> = None;

        for (shard, slot) in slots.iter().enumerate() {
            match (slot.is_none(), open_span) {
                (true, None) => open_span = Some(shard),
                (false, Some(from)) => {
                    spans.push(Self::span_label(from, shard - 1));
                    open_span = None;
                }
                _ => {}
            }
        }
        if let Some(from) = open_span {
            spans.push(Self::span_label(from, slots.len() - 1));
        }

        spans
    }

    fn span_label(from: usize, to: usize) -> String {
        if from == to {
            format!("{}", from)
        } else {
            format!("{}-{}", from, to)
        }
    }
}

impl fmt::Debug for ShardRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backends: Vec<&str> = self.backends.iter().map(|b| b.name()).collect();
        f.debug_struct("ShardRouter")
            .field("shards", &self.table.len())
            .field("backends", &backends)
            .finish()
    }
}
