use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::writer::{SegmentWriter, WriteStatus, WriterContext};

use super::cache::SegmentCache;

/// State of the writer worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Consuming segments as they arrive
    Running,
    /// The back-end asked to be retried later
    Paused,
    /// The worker has exited
    Stopped,
}

const STATE_RUNNING: u8 = 0;
const STATE_PAUSED: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Counters maintained by the writer worker, readable from any thread.
#[derive(Debug, Default)]
pub struct WriterStats {
    written: AtomicU64,
    errors: AtomicU64,
    state: AtomicU8,
}

impl WriterStats {
    /// Segments delivered successfully.
    pub fn segments_written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Segments lost to writer errors.
    pub fn write_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Current worker state.
    pub fn state(&self) -> WriterState {
        match self.state.load(Ordering::Relaxed) {
            STATE_PAUSED => WriterState::Paused,
            STATE_STOPPED => WriterState::Stopped,
            _ => WriterState::Running,
        }
    }

    fn set_state(&self, state: WriterState) {
        let raw = match state {
            WriterState::Running => STATE_RUNNING,
            WriterState::Paused => STATE_PAUSED,
            WriterState::Stopped => STATE_STOPPED,
        };
        self.state.store(raw, Ordering::Relaxed);
    }
}

/// Worker-loop knobs resolved from the muxer configuration.
pub(crate) struct WorkerOptions {
    pub drain_on_close: bool,
    pub pause_retry_interval: Duration,
}

/// Body of the writer worker thread.
///
/// Consumes head segments in sequence order and hands them to the writer
/// back-end. `Pause` keeps the segment cached and retries after a new
/// enqueue or a bounded wait; an error loses that one segment and the loop
/// continues. Once shutdown is signaled the remaining segments get one
/// best-effort attempt each (or are discarded), then the back-end is
/// uninitialized.
pub(crate) fn run_writer_worker(
    mut plugin: Box<dyn SegmentWriter>,
    ctx: WriterContext,
    cache: Arc<SegmentCache>,
    stats: Arc<WriterStats>,
    opts: WorkerOptions,
) {
    stats.set_state(WriterState::Running);
    while let Some(segment) = cache.wait_head() {
        match plugin.write_segment(&ctx, &segment) {
            Ok(WriteStatus::Done) => {
                stats.written.fetch_add(1, Ordering::Relaxed);
                stats.set_state(WriterState::Running);
                debug!(
                    "segment {} written ({} bytes, {:.3}s)",
                    segment.sequence, segment.size, segment.duration
                );
                cache.commit_head(&segment);
            }
            Ok(WriteStatus::Pause) => {
                stats.set_state(WriterState::Paused);
                debug!("writer paused on segment {}", segment.sequence);
                cache.release_head(&segment);
                cache.pause_wait(opts.pause_retry_interval);
            }
            Err(err) => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                stats.set_state(WriterState::Running);
                warn!("segment {} lost: {}", segment.sequence, err);
                cache.commit_head(&segment);
            }
        }
    }

    let remaining = cache.take_remaining();
    if opts.drain_on_close {
        for segment in remaining {
            match plugin.write_segment(&ctx, &segment) {
                Ok(WriteStatus::Done) => {
                    stats.written.fetch_add(1, Ordering::Relaxed);
                }
                Ok(WriteStatus::Pause) => {
                    info!("segment {} skipped at close, writer paused", segment.sequence);
                }
                Err(err) => {
                    stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!("segment {} lost at close: {}", segment.sequence, err);
                }
            }
        }
    } else if !remaining.is_empty() {
        info!("discarding {} cached segments at close", remaining.len());
    }

    plugin.uninit(&ctx);
    stats.set_state(WriterState::Stopped);
}
