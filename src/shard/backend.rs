//! Backend boundary for routed writes
//!
//! A `ShardBackend` is one destination instance behind the router: it accepts
//! writes for the shards it owns and reports its own health. `BufferedBackend`
//! is the in-crate implementation that feeds a frame registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::registry::FrameRegistry;
use crate::stream::StreamId;

/// Aggregate health classification of one or more backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityState {
    /// Every queried backend accepts writes
    Operational,
    /// Some backends accept writes, some do not
    PartiallyOperational,
    /// No queried backend accepts writes
    Failed,
}

impl AvailabilityState {
    /// Get the state as a human-readable string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operational => "operational",
            Self::PartiallyOperational => "partially operational",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AvailabilityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Availability of a router's backends: the composite state plus each distinct
/// backend's own state, keyed by backend name.
#[derive(Debug, Clone)]
pub struct AvailabilityReport {
    state: AvailabilityState,
    backends: HashMap<String, AvailabilityState>,
}

impl AvailabilityReport {
    /// Build a report from per-backend states.
    ///
    /// All operational reduces to operational, all failed to failed, any
    /// mixture to partially operational.
    pub fn from_states(backends: HashMap<String, AvailabilityState>) -> Self {
        let state = Self::reduce(backends.values().copied());
        Self { state, backends }
    }

    /// Build a report from each backend instance's own state.
    ///
    /// Two instances may share a name, so the reduction runs over `states`;
    /// `backends` is the name-keyed view kept for display.
    pub fn from_instance_states(
        states: &[AvailabilityState],
        backends: HashMap<String, AvailabilityState>,
    ) -> Self {
        let state = Self::reduce(states.iter().copied());
        Self { state, backends }
    }

    /// The composite state across all backends
    pub fn state(&self) -> AvailabilityState {
        self.state
    }

    /// Per-backend states, keyed by backend name
    pub fn backend_states(&self) -> &HashMap<String, AvailabilityState> {
        &self.backends
    }

    /// Create a human-readable report of backend availability
    pub fn to_string_pretty(&self) -> String {
        let mut result = String::new();

        result.push_str("=== Availability Report ===\n\n");
        result.push_str(&format!("Overall: {}\n", self.state));

        let mut names: Vec<_> = self.backends.keys().collect();
        names.sort();
        for name in names {
            result.push_str(&format!("  {}: {}\n", name, self.backends[name]));
        }

        result
    }

    fn reduce(states: impl Iterator<Item = AvailabilityState>) -> AvailabilityState {
        let mut total = 0usize;
        let mut operational = 0usize;
        for state in states {
            total += 1;
            if state == AvailabilityState::Operational {
                operational += 1;
            }
        }

        if operational == total {
            AvailabilityState::Operational
        } else if operational == 0 {
            AvailabilityState::Failed
        } else {
            AvailabilityState::PartiallyOperational
        }
    }
}

/// One destination instance behind the shard router
pub trait ShardBackend: Send + Sync {
    /// Name of the backend, for diagnostics and availability reports
    fn name(&self) -> &str;

    /// Accept one write for a stream this backend's shards own
    fn log(&self, stream: &StreamId, protocol_version: u32, payload: &[u8]) -> Result<()>;

    /// Whether this backend currently accepts writes
    fn availability(&self) -> AvailabilityState;
}

/// A backend that buffers routed writes in its own frame registry, where the
/// shipping transport drains them.
pub struct BufferedBackend {
    name: String,
    registry: Arc<FrameRegistry>,
}

impl BufferedBackend {
    /// Create a backend over an open frame registry
    pub fn new(name: impl Into<String>, registry: Arc<FrameRegistry>) -> Self {
        Self {
            name: name.into(),
            registry,
        }
    }

    /// The registry holding this backend's buffered writes
    pub fn registry(&self) -> &Arc<FrameRegistry> {
        &self.registry
    }
}

impl ShardBackend for BufferedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn log(&self, stream: &StreamId, protocol_version: u32, payload: &[u8]) -> Result<()> {
        self.registry.put(stream, protocol_version, payload)
    }

    fn availability(&self) -> AvailabilityState {
        if self.registry.is_open() {
            AvailabilityState::Operational
        } else {
            AvailabilityState::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;

    fn open_registry(dir: &std::path::Path) -> Arc<FrameRegistry> {
        Arc::new(FrameRegistry::open(RegistryConfig::new(dir)).unwrap())
    }

    #[test]
    fn test_buffered_backend_feeds_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());
        let backend = BufferedBackend::new("b0", Arc::clone(&registry));

        let stream = StreamId::new("h", "/var/log/app.log", "app", 0, 1);
        backend.log(&stream, 1, b"hello").unwrap();

        let mut payloads = Vec::new();
        registry
            .for_each_ready_data(|frame| payloads.push(frame.payload().to_vec()))
            .unwrap();
        assert_eq!(payloads, vec![b"hello".to_vec()]);
    }

    #[test]
    fn test_buffered_backend_availability_tracks_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = open_registry(dir.path());
        let backend = BufferedBackend::new("b0", Arc::clone(&registry));

        assert_eq!(backend.availability(), AvailabilityState::Operational);
        registry.close().unwrap();
        assert_eq!(backend.availability(), AvailabilityState::Failed);
    }

    #[test]
    fn test_report_reduction() {
        let all_up = HashMap::from([
            ("a".to_string(), AvailabilityState::Operational),
            ("b".to_string(), AvailabilityState::Operational),
        ]);
        assert_eq!(
            AvailabilityReport::from_states(all_up).state(),
            AvailabilityState::Operational
        );

        let mixed = HashMap::from([
            ("a".to_string(), AvailabilityState::Operational),
            ("b".to_string(), AvailabilityState::Failed),
        ]);
        assert_eq!(
            AvailabilityReport::from_states(mixed).state(),
            AvailabilityState::PartiallyOperational
        );

        let all_down = HashMap::from([
            ("a".to_string(), AvailabilityState::Failed),
            ("b".to_string(), AvailabilityState::Failed),
        ]);
        assert_eq!(
            AvailabilityReport::from_states(all_down).state(),
            AvailabilityState::Failed
        );
    }

    #[test]
    fn test_instance_reduction_survives_name_collisions() {
        let states = [AvailabilityState::Operational, AvailabilityState::Failed];
        let named = HashMap::from([("dup".to_string(), AvailabilityState::Failed)]);

        let report = AvailabilityReport::from_instance_states(&states, named);
        assert_eq!(report.state(), AvailabilityState::PartiallyOperational);
        assert_eq!(report.backend_states().len(), 1);
    }

    #[test]
    fn test_report_pretty_string() {
        let report = AvailabilityReport::from_states(HashMap::from([
            ("west".to_string(), AvailabilityState::Operational),
            ("east".to_string(), AvailabilityState::Failed),
        ]));

        let pretty = report.to_string_pretty();
        assert!(pretty.contains("Overall: partially operational"));
        assert!(pretty.contains("east: failed"));
        assert!(pretty.contains("west: operational"));
    }
}
