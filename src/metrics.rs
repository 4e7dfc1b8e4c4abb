use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Performance metrics collector for Baler
#[derive(Debug)]
pub struct MetricsCollector {
    // Operation counts
    /// Number of accepted put operations
    put_count: AtomicUsize,
    /// Number of frame rotations triggered by overflow
    rotation_count: AtomicUsize,
    /// Number of open frames force-closed by a drain or shutdown
    forced_close_count: AtomicUsize,
    /// Number of drain passes
    drain_count: AtomicUsize,

    // Data metrics
    /// Total payload bytes accepted into frames
    bytes_buffered: AtomicUsize,
    /// Number of frames handed to drain consumers
    frames_drained: AtomicUsize,
    /// Number of frames persisted at shutdown
    frames_persisted: AtomicUsize,
    /// Number of frames reloaded from the durable directory
    frames_reloaded: AtomicUsize,

    // Timing metrics
    /// Total persist duration in nanoseconds
    persist_duration_ns: AtomicU64,
    /// Total reload duration in nanoseconds
    reload_duration_ns: AtomicU64,
    /// Total drain duration in nanoseconds
    drain_duration_ns: AtomicU64,
    /// Last persist duration
    last_persist_duration: Mutex<Duration>,

    // Shard mapping metrics
    /// Number of mapper cache hits
    cache_hits: AtomicUsize,
    /// Number of mapper cache misses
    cache_misses: AtomicUsize,

    // Routing metrics
    /// Number of writes forwarded to a backend
    routed_writes: AtomicUsize,
    /// Number of writes that failed to resolve or route
    routing_failures: AtomicUsize,

    // Internal state
    /// Start time of the metrics collector
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            // Operation counts
            put_count: AtomicUsize::new(0),
            rotation_count: AtomicUsize::new(0),
            forced_close_count: AtomicUsize::new(0),
            drain_count: AtomicUsize::new(0),

            // Data metrics
            bytes_buffered: AtomicUsize::new(0),
            frames_drained: AtomicUsize::new(0),
            frames_persisted: AtomicUsize::new(0),
            frames_reloaded: AtomicUsize::new(0),

            // Timing metrics
            persist_duration_ns: AtomicU64::new(0),
            reload_duration_ns: AtomicU64::new(0),
            drain_duration_ns: AtomicU64::new(0),
            last_persist_duration: Mutex::new(Duration::from_secs(0)),

            // Shard mapping metrics
            cache_hits: AtomicUsize::new(0),
            cache_misses: AtomicUsize::new(0),

            // Routing metrics
            routed_writes: AtomicUsize::new(0),
            routing_failures: AtomicUsize::new(0),

            // Internal state
            start_time: Instant::now(),
        }
    }

    // Operation count methods

    /// Increment accepted put count
    pub fn increment_puts(&self) {
        self.put_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment rotation count
    pub fn increment_rotations(&self) {
        self.rotation_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment forced close count
    pub fn increment_forced_closes(&self) {
        self.forced_close_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment drain pass count
    pub fn increment_drains(&self) {
        self.drain_count.fetch_add(1, Ordering::Relaxed);
    }

    // Data metrics methods

    /// Add accepted payload bytes
    pub fn add_bytes_buffered(&self, bytes: usize) {
        self.bytes_buffered.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Add frames handed to a drain consumer
    pub fn add_frames_drained(&self, count: usize) {
        self.frames_drained.fetch_add(count, Ordering::Relaxed);
    }

    /// Add frames persisted at shutdown
    pub fn add_frames_persisted(&self, count: usize) {
        self.frames_persisted.fetch_add(count, Ordering::Relaxed);
    }

    /// Add frames reloaded from disk
    pub fn add_frames_reloaded(&self, count: usize) {
        self.frames_reloaded.fetch_add(count, Ordering::Relaxed);
    }

    // Timing metrics methods

    /// Record a persist pass duration
    pub fn record_persist_duration(&self, duration: Duration) {
        self.persist_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        *self.last_persist_duration.lock() = duration;
    }

    /// Record a reload pass duration
    pub fn record_reload_duration(&self, duration: Duration) {
        self.reload_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record a drain pass duration
    pub fn record_drain_duration(&self, duration: Duration) {
        self.drain_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    // Shard mapping metrics methods

    /// Increment mapper cache hits
    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment mapper cache misses
    pub fn increment_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    // Routing metrics methods

    /// Increment routed write count
    pub fn increment_routed_writes(&self) {
        self.routed_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment routing failure count
    pub fn increment_routing_failures(&self) {
        self.routing_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Getters

    /// Get number of accepted puts
    pub fn get_put_count(&self) -> usize {
        self.put_count.load(Ordering::Relaxed)
    }

    /// Get number of rotations
    pub fn get_rotation_count(&self) -> usize {
        self.rotation_count.load(Ordering::Relaxed)
    }

    /// Get number of forced closes
    pub fn get_forced_close_count(&self) -> usize {
        self.forced_close_count.load(Ordering::Relaxed)
    }

    /// Get number of drain passes
    pub fn get_drain_count(&self) -> usize {
        self.drain_count.load(Ordering::Relaxed)
    }

    /// Get total payload bytes accepted
    pub fn get_bytes_buffered(&self) -> usize {
        self.bytes_buffered.load(Ordering::Relaxed)
    }

    /// Get number of frames drained
    pub fn get_frames_drained(&self) -> usize {
        self.frames_drained.load(Ordering::Relaxed)
    }

    /// Get number of frames persisted
    pub fn get_frames_persisted(&self) -> usize {
        self.frames_persisted.load(Ordering::Relaxed)
    }

    /// Get number of frames reloaded
    pub fn get_frames_reloaded(&self) -> usize {
        self.frames_reloaded.load(Ordering::Relaxed)
    }

    /// Get total persist duration
    pub fn get_persist_duration(&self) -> Duration {
        Duration::from_nanos(self.persist_duration_ns.load(Ordering::Relaxed))
    }

    /// Get last persist duration
    pub fn get_last_persist_duration(&self) -> Duration {
        *self.last_persist_duration.lock()
    }

    /// Get total reload duration
    pub fn get_reload_duration(&self) -> Duration {
        Duration::from_nanos(self.reload_duration_ns.load(Ordering::Relaxed))
    }

    /// Get total drain duration
    pub fn get_drain_duration(&self) -> Duration {
        Duration::from_nanos(self.drain_duration_ns.load(Ordering::Relaxed))
    }

    /// Get number of mapper cache hits
    pub fn get_cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Get number of mapper cache misses
    pub fn get_cache_misses(&self) -> usize {
        self.cache_misses.load(Ordering::Relaxed)
    }

    /// Get mapper cache hit rate (0.0 - 1.0)
    pub fn get_cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);

        if hits + misses == 0 {
            return 0.0;
        }

        hits as f64 / (hits + misses) as f64
    }

    /// Get number of routed writes
    pub fn get_routed_writes(&self) -> usize {
        self.routed_writes.load(Ordering::Relaxed)
    }

    /// Get number of routing failures
    pub fn get_routing_failures(&self) -> usize {
        self.routing_failures.load(Ordering::Relaxed)
    }

    /// Get uptime of the metrics collector
    pub fn get_uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.put_count.store(0, Ordering::Relaxed);
        self.rotation_count.store(0, Ordering::Relaxed);
        self.forced_close_count.store(0, Ordering::Relaxed);
        self.drain_count.store(0, Ordering::Relaxed);

        self.bytes_buffered.store(0, Ordering::Relaxed);
        self.frames_drained.store(0, Ordering::Relaxed);
        self.frames_persisted.store(0, Ordering::Relaxed);
        self.frames_reloaded.store(0, Ordering::Relaxed);

        self.persist_duration_ns.store(0, Ordering::Relaxed);
        self.reload_duration_ns.store(0, Ordering::Relaxed);
        self.drain_duration_ns.store(0, Ordering::Relaxed);
        *self.last_persist_duration.lock() = Duration::from_secs(0);

        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);

        self.routed_writes.store(0, Ordering::Relaxed);
        self.routing_failures.store(0, Ordering::Relaxed);
    }

    /// Get a report of all metrics
    pub fn get_report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Baler Metrics Report ===\n\n");

        let uptime = self.get_uptime();
        report.push_str(&format!("Uptime: {:?}\n\n", uptime));

        report.push_str("Operation Counts:\n");
        report.push_str(&format!("  Puts: {}\n", self.get_put_count()));
        report.push_str(&format!("  Rotations: {}\n", self.get_rotation_count()));
        report.push_str(&format!(
            "  Forced Closes: {}\n",
            self.get_forced_close_count()
        ));
        report.push_str(&format!("  Drain Passes: {}\n\n", self.get_drain_count()));

        report.push_str("Data Metrics:\n");
        report.push_str(&format!("  Bytes Buffered: {}\n", self.get_bytes_buffered()));
        report.push_str(&format!("  Frames Drained: {}\n", self.get_frames_drained()));
        report.push_str(&format!(
            "  Frames Persisted: {}\n",
            self.get_frames_persisted()
        ));
        report.push_str(&format!(
            "  Frames Reloaded: {}\n\n",
            self.get_frames_reloaded()
        ));

        report.push_str("Performance Metrics:\n");
        report.push_str(&format!(
            "  Last Persist Time: {:?}\n",
            self.get_last_persist_duration()
        ));
        report.push_str(&format!(
            "  Mapper Cache Hit Rate: {:.2}%\n\n",
            self.get_cache_hit_rate() * 100.0
        ));

        report.push_str("Routing Metrics:\n");
        report.push_str(&format!("  Routed Writes: {}\n", self.get_routed_writes()));
        report.push_str(&format!(
            "  Routing Failures: {}\n",
            self.get_routing_failures()
        ));

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_metrics_basic_recording() {
        let metrics = MetricsCollector::new();

        metrics.increment_puts();
        metrics.increment_rotations();
        metrics.increment_forced_closes();
        metrics.increment_drains();

        assert_eq!(metrics.get_put_count(), 1);
        assert_eq!(metrics.get_rotation_count(), 1);
        assert_eq!(metrics.get_forced_close_count(), 1);
        assert_eq!(metrics.get_drain_count(), 1);
    }

    #[test]
    fn test_metrics_data_recording() {
        let metrics = MetricsCollector::new();

        metrics.add_bytes_buffered(1000);
        metrics.add_frames_drained(3);
        metrics.add_frames_persisted(2);
        metrics.add_frames_reloaded(2);

        assert_eq!(metrics.get_bytes_buffered(), 1000);
        assert_eq!(metrics.get_frames_drained(), 3);
        assert_eq!(metrics.get_frames_persisted(), 2);
        assert_eq!(metrics.get_frames_reloaded(), 2);
    }

    #[test]
    fn test_metrics_timing_recording() {
        let metrics = MetricsCollector::new();

        let duration = Duration::from_millis(100);
        metrics.record_persist_duration(duration);
        metrics.record_reload_duration(duration);
        metrics.record_drain_duration(duration);

        assert_eq!(metrics.get_persist_duration(), duration);
        assert_eq!(metrics.get_last_persist_duration(), duration);
        assert_eq!(metrics.get_reload_duration(), duration);
        assert_eq!(metrics.get_drain_duration(), duration);
    }

    #[test]
    fn test_metrics_cache_recording() {
        let metrics = MetricsCollector::new();

        for _ in 0..75 {
            metrics.increment_cache_hits();
        }
        for _ in 0..25 {
            metrics.increment_cache_misses();
        }

        assert_eq!(metrics.get_cache_hit_rate(), 0.75);
    }

    #[test]
    fn test_metrics_report() {
        let metrics = MetricsCollector::new();

        metrics.increment_puts();
        metrics.add_bytes_buffered(1000);
        metrics.increment_routed_writes();

        let report = metrics.get_report();
        assert!(!report.is_empty());
        assert!(report.contains("Operation Counts:"));
        assert!(report.contains("Data Metrics:"));
        assert!(report.contains("Routing Metrics:"));
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = MetricsCollector::new();

        metrics.increment_puts();
        metrics.add_bytes_buffered(1000);
        metrics.reset();

        assert_eq!(metrics.get_put_count(), 0);
        assert_eq!(metrics.get_bytes_buffered(), 0);
    }

    #[test]
    fn test_metrics_thread_safety() {
        let metrics = Arc::new(MetricsCollector::new());
        let mut handles = Vec::new();

        for _ in 0..10 {
            let metrics_clone = metrics.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    metrics_clone.increment_puts();
                    metrics_clone.add_bytes_buffered(10);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.get_put_count(), 1000);
        assert_eq!(metrics.get_bytes_buffered(), 10000);
    }
}
