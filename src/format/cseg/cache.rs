use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};

use super::segment::Segment;

/// Result of offering a closed segment to the cache.
#[derive(Debug)]
pub enum EnqueueOutcome {
    /// The segment was stored; the ring had room.
    Stored,
    /// The ring was full; the oldest segment was evicted to make room.
    EvictedOldest(Arc<Segment>),
    /// The cache is shutting down; the segment was not stored.
    ShuttingDown,
}

struct Ring {
    queue: VecDeque<Arc<Segment>>,
    /// Head segment currently inside a writer call, if any.
    writing: Option<Arc<Segment>>,
    shutdown: bool,
}

impl Ring {
    fn total_duration(&self) -> f64 {
        self.queue.iter().map(|s| s.duration).sum()
    }

    fn head_is_writing(&self) -> bool {
        match (&self.writing, self.queue.front()) {
            (Some(w), Some(h)) => Arc::ptr_eq(w, h),
            _ => false,
        }
    }
}

/// Bounded FIFO of closed segments shared between the producer and the
/// writer worker.
///
/// A single mutex serializes mutation; two condition variables signal
/// not-empty (to the worker) and not-full (to a blocked producer). The head
/// segment keeps its slot while the worker writes it, so a slow writer
/// exerts backpressure through the ring; in non-blocking mode the producer
/// may still evict that slot and the worker finishes the write on its own
/// handle.
pub struct SegmentCache {
    ring: Mutex<Ring>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    pre_recording_time: f64,
    nonblock: bool,
    evictions: AtomicU64,
}

impl SegmentCache {
    /// Creates a cache holding at most `capacity` segments (`capacity >= 1`).
    pub fn new(capacity: usize, pre_recording_time: f64, nonblock: bool) -> Self {
        Self {
            ring: Mutex::new(Ring {
                queue: VecDeque::with_capacity(capacity),
                writing: None,
                shutdown: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            pre_recording_time,
            nonblock,
            evictions: AtomicU64::new(0),
        }
    }

    /// Offers a closed segment.
    ///
    /// With room the segment is stored. When full, non-blocking mode always
    /// evicts the oldest slot; blocking mode evicts the oldest segment not
    /// currently being written, provided the remaining retained duration
    /// stays at or above the configured pre-recording time. Otherwise the
    /// call suspends until the worker frees a slot or shutdown is signaled.
    pub fn enqueue(&self, segment: Arc<Segment>) -> EnqueueOutcome {
        let mut ring = self.ring.lock();
        loop {
            if ring.shutdown {
                return EnqueueOutcome::ShuttingDown;
            }
            if ring.queue.len() < self.capacity {
                ring.queue.push_back(segment);
                self.not_empty.notify_one();
                return EnqueueOutcome::Stored;
            }
            if self.nonblock {
                let evicted = ring
                    .queue
                    .pop_front()
                    .expect("full ring has a head segment");
                ring.queue.push_back(segment);
                self.note_eviction(&evicted);
                self.not_empty.notify_one();
                return EnqueueOutcome::EvictedOldest(evicted);
            }
            // the in-flight head is about to leave on its own; the eviction
            // candidate is the oldest segment not being written
            let candidate = if ring.head_is_writing() { 1 } else { 0 };
            let victim_duration = ring.queue.get(candidate).map(|s| s.duration);
            if let Some(duration) = victim_duration {
                if ring.total_duration() - duration >= self.pre_recording_time {
                    let evicted = ring
                        .queue
                        .remove(candidate)
                        .expect("candidate index verified above");
                    ring.queue.push_back(segment);
                    self.note_eviction(&evicted);
                    self.not_empty.notify_one();
                    return EnqueueOutcome::EvictedOldest(evicted);
                }
            }
            self.not_full.wait(&mut ring);
        }
    }

    /// Stores the final segment at shutdown time; never blocks. The queue
    /// may exceed capacity by this one slot, the drain policy takes it from
    /// here.
    pub(crate) fn enqueue_final(&self, segment: Arc<Segment>) -> bool {
        let mut ring = self.ring.lock();
        if ring.shutdown {
            return false;
        }
        ring.queue.push_back(segment);
        self.not_empty.notify_one();
        true
    }

    /// Worker side: blocks until a head segment is available and marks it as
    /// being written. Returns `None` once shutdown is signaled.
    pub fn wait_head(&self) -> Option<Arc<Segment>> {
        let mut ring = self.ring.lock();
        loop {
            if ring.shutdown {
                return None;
            }
            if let Some(head) = ring.queue.front().cloned() {
                ring.writing = Some(head.clone());
                return Some(head);
            }
            self.not_empty.wait(&mut ring);
        }
    }

    /// Worker side: the write concluded (success or error). Frees the slot
    /// if the segment still occupies the head; it may have been evicted
    /// meanwhile in non-blocking mode.
    pub fn commit_head(&self, segment: &Arc<Segment>) {
        let mut ring = self.ring.lock();
        ring.writing = None;
        if ring
            .queue
            .front()
            .map(|head| Arc::ptr_eq(head, segment))
            .unwrap_or(false)
        {
            ring.queue.pop_front();
            self.not_full.notify_one();
        }
    }

    /// Worker side: the writer asked to pause. The segment stays queued and
    /// becomes an ordinary eviction candidate again.
    pub fn release_head(&self, _segment: &Arc<Segment>) {
        let mut ring = self.ring.lock();
        ring.writing = None;
    }

    /// Worker side: sleeps until a new segment is enqueued, shutdown fires,
    /// or `timeout` elapses. Used between pause retries.
    pub fn pause_wait(&self, timeout: Duration) {
        let mut ring = self.ring.lock();
        if ring.shutdown {
            return;
        }
        let _ = self.not_empty.wait_for(&mut ring, timeout);
    }

    /// Signals shutdown and wakes both sides.
    pub fn shutdown(&self) {
        let mut ring = self.ring.lock();
        ring.shutdown = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Whether shutdown has been signaled.
    pub fn is_shutdown(&self) -> bool {
        self.ring.lock().shutdown
    }

    /// Takes every queued segment out of the ring (drain at close).
    pub fn take_remaining(&self) -> Vec<Arc<Segment>> {
        let mut ring = self.ring.lock();
        ring.writing = None;
        let remaining = ring.queue.drain(..).collect();
        self.not_full.notify_all();
        remaining
    }

    /// Number of segments currently held.
    pub fn len(&self) -> usize {
        self.ring.lock().queue.len()
    }

    /// Whether the ring holds no segments.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the durations of all held segments, seconds.
    pub fn total_duration(&self) -> f64 {
        self.ring.lock().total_duration()
    }

    /// Number of segments evicted so far.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    fn note_eviction(&self, evicted: &Arc<Segment>) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        warn!(
            "cache full, evicted segment {} ({:.3}s at {:.3})",
            evicted.sequence, evicted.duration, evicted.start_ts
        );
        debug!("evictions so far: {}", self.evictions.load(Ordering::Relaxed));
    }
}
