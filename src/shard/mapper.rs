//! Shard number extraction from file paths
//!
//! The mapper matches a stream's file path against a configured pattern with a
//! single capture group and parses the captured text as the shard number.
//! Results are memoized in a bounded, time-expiring cache so the hot path is a
//! lookup after warm-up.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;

use crate::error::{Error, Result};
use crate::metrics::MetricsCollector;

/// Default bound on cached path-to-shard entries
pub const DEFAULT_CACHE_CAPACITY: usize = 1_000_000;

/// Default lifetime of a cached path-to-shard entry
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Resolves the destination shard for one write.
///
/// The payload is available so content-derived resolvers can plug into the
/// router through the same seam; the pattern mapper ignores it.
pub trait ShardResolver: Send + Sync {
    /// Resolve the shard number for a write
    fn resolve(&self, host_name: &str, file_path: &str, payload: &[u8]) -> Result<u32>;
}

/// Extracts shard numbers from file paths via a single-capture-group pattern
pub struct ShardMapper {
    pattern: Regex,
    cache: Mutex<LruCache<String, (u32, Instant)>>,
    ttl: Duration,
    metrics: Arc<MetricsCollector>,
}

impl ShardMapper {
    /// Create a mapper with the default cache bounds
    pub fn new(pattern: &str) -> Result<Self> {
        Self::with_parts(
            pattern,
            DEFAULT_CACHE_CAPACITY,
            DEFAULT_CACHE_TTL,
            Arc::new(MetricsCollector::new()),
        )
    }

    /// Create a mapper with explicit cache bounds and a metrics collector
    pub fn with_parts(
        pattern: &str,
        cache_capacity: usize,
        cache_ttl: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self> {
        let compiled = Regex::new(pattern)
            .map_err(|err| Error::config(format!("invalid shard pattern '{}': {}", pattern, err)))?;

        // captures_len counts the implicit whole-match group
        if compiled.captures_len() != 2 {
            return Err(Error::config(format!(
                "shard pattern '{}' must contain exactly one capture group, found {}",
                pattern,
                compiled.captures_len() - 1
            )));
        }

        let capacity = NonZeroUsize::new(cache_capacity)
            .ok_or_else(|| Error::config("Mapper cache capacity must be at least 1"))?;

        Ok(Self {
            pattern: compiled,
            cache: Mutex::new(LruCache::new(capacity)),
            ttl: cache_ttl,
            metrics,
        })
    }

    /// Get the shard number for a file path.
    ///
    /// A path the pattern does not match, or a captured group that is not a
    /// number, is an explicit per-call error, never a silent default.
    pub fn shard_number(&self, file_path: &str) -> Result<u32> {
        {
            let mut cache = self.cache.lock();
            let cached = cache.get(file_path).copied();
            match cached {
                Some((shard, cached_at)) if cached_at.elapsed() < self.ttl => {
                    self.metrics.increment_cache_hits();
                    return Ok(shard);
                }
                Some(_) => {
                    cache.pop(file_path);
                }
                None => {}
            }
        }
        self.metrics.increment_cache_misses();

        // Matching happens outside the lock; concurrent lookups of the same
        // cold path may recompute, the last result wins
        let shard = self.compute_shard(file_path)?;
        self.cache
            .lock()
            .put(file_path.to_string(), (shard, Instant::now()));
        Ok(shard)
    }

    /// The configured shard pattern
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    fn compute_shard(&self, file_path: &str) -> Result<u32> {
        let captures = self.pattern.captures(file_path).ok_or_else(|| {
            Error::shard(format!(
                "file path '{}' does not match shard pattern '{}'",
                file_path,
                self.pattern.as_str()
            ))
        })?;

        let group = captures.get(1).ok_or_else(|| {
            Error::shard(format!(
                "shard pattern matched '{}' but the capture group is empty",
                file_path
            ))
        })?;

        group.as_str().parse::<u32>().map_err(|_| {
            Error::shard(format!(
                "captured shard '{}' in '{}' is not a number",
                group.as_str(),
                file_path
            ))
        })
    }
}

impl fmt::Debug for ShardMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardMapper")
            .field("pattern", &self.pattern.as_str())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ShardResolver for ShardMapper {
    fn resolve(&self, _host_name: &str, file_path: &str, _payload: &[u8]) -> Result<u32> {
        self.shard_number(file_path)
    }
}
