use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{CapacityTable, RegistryConfig};
use crate::durable::DurableStore;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::ids::{IdAllocator, SequentialIdAllocator};
use crate::metrics::MetricsCollector;
use crate::stream::StreamId;

/// Statistics about a frame registry
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Number of streams with an open frame
    pub open_frames: usize,
    /// Number of closed frames waiting to be drained
    pub queued_frames: usize,
    /// Payload bytes sitting in open frames
    pub open_payload_bytes: usize,
    /// Accepted put operations
    pub put_ops: usize,
    /// Frame rotations triggered by overflow
    pub rotations: usize,
    /// Frames force-closed by drains or shutdown
    pub forced_closes: usize,
    /// Frames handed to drain consumers
    pub frames_drained: usize,
    /// Frames persisted at shutdown
    pub frames_persisted: usize,
    /// Frames reloaded from the durable directory
    pub frames_reloaded: usize,
}

/// A closed frame waiting to be drained. Frames reloaded from disk keep the
/// file that holds them until a consumer takes delivery.
struct QueuedFrame {
    frame: Frame,
    durable_path: Option<PathBuf>,
}

struct RegistryInner {
    /// Open frame per stream identity
    open: HashMap<StreamId, Frame>,
    /// Stream identities in first-seen order; positions survive rotation
    order: Vec<StreamId>,
    /// Closed frames in id order
    ready: VecDeque<QueuedFrame>,
    /// Cleared by close(); no further puts or drains are accepted
    accepting: bool,
}

/// Registry of open frames per stream plus the queue of closed frames
/// awaiting shipment.
///
/// Producers call `put`; a full frame is closed under a fresh id, queued, and
/// replaced without the producer noticing. The shipping transport calls
/// `for_each_ready_data` to take every completed frame in id order. `close`
/// persists whatever was accepted but not yet drained, and opening a registry
/// on the same directory reloads it with ids intact.
///
/// All registry state sits behind one mutex, so id assignment and enqueueing
/// happen atomically: queue order always equals id order.
pub struct FrameRegistry {
    config: RegistryConfig,
    capacities: CapacityTable,
    inner: Mutex<RegistryInner>,
    durable: DurableStore,
    ids: Arc<dyn IdAllocator>,
    metrics: Arc<MetricsCollector>,
}

impl FrameRegistry {
    /// Open a registry, reloading any frames persisted by an earlier run
    pub fn open(config: RegistryConfig) -> Result<Self> {
        Self::with_parts(
            config,
            Arc::new(SequentialIdAllocator::new()),
            Arc::new(MetricsCollector::new()),
        )
    }

    /// Open a registry with an injected id allocator and metrics collector
    pub fn with_parts(
        config: RegistryConfig,
        ids: Arc<dyn IdAllocator>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self> {
        config.validate()?;
        let capacities = config.capacity_table()?;
        let durable = DurableStore::acquire(
            &config.durable_dir,
            config.sync_writes,
            config.verify_checksums,
        )?;

        let start = Instant::now();
        let mut ready = VecDeque::new();
        for (frame, path) in durable.load_all()? {
            if let Some(id) = frame.id() {
                ids.advance_past(id);
            }
            ready.push_back(QueuedFrame {
                frame,
                durable_path: Some(path),
            });
        }
        let reloaded = ready.len();
        if reloaded > 0 {
            metrics.add_frames_reloaded(reloaded);
            metrics.record_reload_duration(start.elapsed());
        }
        info!(
            dir = %config.durable_dir.display(),
            reloaded,
            "opened frame registry"
        );

        Ok(Self {
            config,
            capacities,
            inner: Mutex::new(RegistryInner {
                open: HashMap::new(),
                order: Vec::new(),
                ready,
                accepting: true,
            }),
            durable,
            ids,
            metrics,
        })
    }

    /// Append a payload to the stream's open frame, rotating on overflow.
    ///
    /// Rotation is invisible to the caller: the full frame is closed under
    /// the next id, queued for drain, and a fresh frame takes the write. A
    /// payload that cannot fit even a fresh frame is a configuration error.
    pub fn put(&self, stream: &StreamId, protocol_version: u32, payload: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.accepting {
            return Err(Error::Closed);
        }

        let mut frame = match inner.open.remove(stream) {
            Some(frame) => frame,
            None => {
                let frame = self.new_frame(stream, protocol_version)?;
                inner.order.push(stream.clone());
                frame
            }
        };

        if frame.put_bytes(payload) {
            inner.open.insert(stream.clone(), frame);
            self.metrics.increment_puts();
            self.metrics.add_bytes_buffered(payload.len());
            return Ok(());
        }

        // Overflow on an empty frame means no rotation can ever help
        if frame.is_empty() {
            inner.open.insert(stream.clone(), frame);
            return Err(Self::oversized(stream, payload.len()));
        }

        let id = self.ids.next();
        frame.close(id)?;
        debug!(id, stream = %stream, len = frame.len(), "rotated frame");
        inner.ready.push_back(QueuedFrame {
            frame,
            durable_path: None,
        });
        self.metrics.increment_rotations();

        let mut fresh = self.new_frame(stream, protocol_version)?;
        let accepted = fresh.put_bytes(payload);
        inner.open.insert(stream.clone(), fresh);
        if !accepted {
            return Err(Self::oversized(stream, payload.len()));
        }

        self.metrics.increment_puts();
        self.metrics.add_bytes_buffered(payload.len());
        Ok(())
    }

    /// Hand every completed frame to `consumer`, in ascending id order.
    ///
    /// Already-closed frames come first, then every non-empty open frame is
    /// force-closed (next ids, first-seen stream order) and handed over too.
    /// Frames enqueued while the consumer runs stay for the next drain. The
    /// durable file of a reloaded frame is unlinked once its consumer call
    /// returns. Returns the number of frames delivered.
    pub fn for_each_ready_data<F: FnMut(Frame)>(&self, mut consumer: F) -> Result<usize> {
        let start = Instant::now();
        let batch = {
            let mut inner = self.inner.lock();
            if !inner.accepting {
                return Err(Error::Closed);
            }
            self.snapshot_ready(&mut inner)?
        };

        let count = batch.len();
        for queued in batch {
            consumer(queued.frame);
            if let Some(path) = queued.durable_path {
                if let Err(err) = self.durable.remove(&path) {
                    warn!(path = %path.display(), %err, "failed to remove drained frame file");
                }
            }
        }

        self.metrics.increment_drains();
        self.metrics.add_frames_drained(count);
        self.metrics.record_drain_duration(start.elapsed());
        if count > 0 {
            debug!(frames = count, "drained ready frames");
        }
        Ok(count)
    }

    /// Close the registry: reject further work and persist every completed
    /// frame that no consumer has taken.
    ///
    /// Remaining open frames are force-closed first, so nothing accepted is
    /// lost. A durable write failure is returned and the unpersisted frames
    /// stay queued; calling close again retries them. Closing an already
    /// cleanly closed registry is a no-op.
    pub fn close(&self) -> Result<()> {
        let start = Instant::now();
        let batch = {
            let mut inner = self.inner.lock();
            let was_accepting = inner.accepting;
            inner.accepting = false;
            if !was_accepting && inner.ready.is_empty() && inner.open.is_empty() {
                return Ok(());
            }
            self.snapshot_ready(&mut inner)?
        };

        let mut remaining: VecDeque<QueuedFrame> = batch.into();
        let mut persisted = 0usize;
        let total = remaining.len();
        while let Some(queued) = remaining.pop_front() {
            // Reloaded frames already own a durable file with these bytes
            if queued.durable_path.is_none() {
                if let Err(err) = self.durable.persist(&queued.frame) {
                    remaining.push_front(queued);
                    let mut inner = self.inner.lock();
                    inner.ready = remaining;
                    return Err(err);
                }
                persisted += 1;
            }
        }

        self.metrics.add_frames_persisted(persisted);
        self.metrics.record_persist_duration(start.elapsed());
        info!(persisted, undrained = total, "closed frame registry");
        Ok(())
    }

    /// Whether the registry still accepts puts and drains
    pub fn is_open(&self) -> bool {
        self.inner.lock().accepting
    }

    /// Get statistics about the registry
    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        let open_payload_bytes = inner.open.values().map(|f| f.payload().len()).sum();

        RegistryStats {
            open_frames: inner.open.len(),
            queued_frames: inner.ready.len(),
            open_payload_bytes,
            put_ops: self.metrics.get_put_count(),
            rotations: self.metrics.get_rotation_count(),
            forced_closes: self.metrics.get_forced_close_count(),
            frames_drained: self.metrics.get_frames_drained(),
            frames_persisted: self.metrics.get_frames_persisted(),
            frames_reloaded: self.metrics.get_frames_reloaded(),
        }
    }

    /// The registry's configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The directory holding persisted frames
    pub fn durable_dir(&self) -> &Path {
        self.durable.dir()
    }

    /// The registry's metrics collector
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    // Internal methods

    /// Take every ready frame plus the force-closed remainder of the live
    /// map, in ascending id order. Empty open frames are dropped.
    fn snapshot_ready(&self, inner: &mut RegistryInner) -> Result<Vec<QueuedFrame>> {
        let mut batch: Vec<QueuedFrame> = inner.ready.drain(..).collect();

        let order = std::mem::take(&mut inner.order);
        for stream in order {
            if let Some(mut frame) = inner.open.remove(&stream) {
                if frame.is_empty() {
                    continue;
                }
                let id = self.ids.next();
                frame.close(id)?;
                self.metrics.increment_forced_closes();
                batch.push(QueuedFrame {
                    frame,
                    durable_path: None,
                });
            }
        }
        debug_assert!(inner.open.is_empty());

        Ok(batch)
    }

    fn new_frame(&self, stream: &StreamId, protocol_version: u32) -> Result<Frame> {
        let capacity = self.capacities.resolve(stream.file_path());
        Frame::new(capacity, stream.clone(), protocol_version)
    }

    fn oversized(stream: &StreamId, payload_len: usize) -> Error {
        Error::config(format!(
            "payload of {} bytes can never fit a frame for {}: required buffer size is too big",
            payload_len, stream
        ))
    }
}

impl Drop for FrameRegistry {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.close() {
                error!(%e, "error closing frame registry");
            }
        }
    }
}
