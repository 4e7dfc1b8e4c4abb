//! Frame id allocation
//!
//! Ids are a process-wide logical clock: every frame close consumes exactly
//! one id, ids strictly increase in close order, and reload advances the
//! clock past the persisted high-water mark before any new close.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of monotonically increasing frame ids.
///
/// Ids are assigned at close time, under the registry lock, so enqueue order
/// always equals id order. Implementations must be safe to share across
/// producer threads.
pub trait IdAllocator: Send + Sync {
    /// Take the next id. Never returns the same value twice in-process.
    fn next(&self) -> u64;

    /// Ensure all future ids are strictly greater than `id`
    fn advance_past(&self, id: u64);
}

/// Default allocator: a single atomic counter, first id 1
#[derive(Debug)]
pub struct SequentialIdAllocator {
    next_id: AtomicU64,
}

impl SequentialIdAllocator {
    /// Create an allocator whose first id is 1
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create an allocator whose first id is `first`
    pub fn starting_at(first: u64) -> Self {
        Self {
            next_id: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator for SequentialIdAllocator {
    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn advance_past(&self, id: u64) {
        self.next_id.fetch_max(id + 1, Ordering::SeqCst);
    }
}
