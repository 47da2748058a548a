use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info, trace, warn};
use url::Url;

use crate::av::{AccessUnit, StreamInfo, StreamKind};
use crate::config::MuxerConfig;
use crate::error::{CsegError, Result};
use crate::format::ts::{TsEncoder, TS_PACKET_SIZE};
use crate::writer::{WriterContext, WriterRegistry};

use super::cache::{EnqueueOutcome, SegmentCache};
use super::segment::SegmentBuilder;
use super::worker::{run_writer_worker, WorkerOptions, WriterState, WriterStats};

/// Bytes the PSI burst adds to the front of every segment.
const PSI_BURST_SIZE: usize = 2 * TS_PACKET_SIZE;

/// Lifecycle of the muxer context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MuxerState {
    /// Being constructed inside `open`
    Init,
    /// Opened, no packet written yet
    Open,
    /// At least one packet written
    Writing,
    /// `close` in progress
    Closing,
    /// Closed; all resources released
    Closed,
}

/// Counter snapshot of a running muxer.
#[derive(Debug, Clone, Copy)]
pub struct MuxerStats {
    /// Segments delivered by the writer
    pub segments_written: u64,
    /// Segments lost to writer errors
    pub write_errors: u64,
    /// Segments evicted from the cache
    pub evictions: u64,
    /// Segments currently cached
    pub cached_segments: usize,
    /// Total duration currently cached, seconds
    pub cached_duration: f64,
}

/// The cached segment muxer.
///
/// Owns the packet path (TS encoder and the currently open segment), the
/// bounded segment cache, and the writer worker thread consuming it. The
/// calling thread is the producer: [`write_packet`](Self::write_packet)
/// only ever blocks inside a full-cache enqueue in blocking mode.
///
/// ## Example Usage
///
/// ```rust
/// use cseg::av::{AccessUnit, StreamInfo};
/// use cseg::config::MuxerConfig;
/// use cseg::format::cseg::CachedSegmentMuxer;
/// use cseg::writer::WriterRegistry;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = WriterRegistry::with_builtin_writers();
/// let config = MuxerConfig::new("dummy://demo").with_segment_time(2.0);
/// let streams = vec![StreamInfo::video_h264()];
/// let mut muxer = CachedSegmentMuxer::open(config, streams, &registry)?;
///
/// let idr = AccessUnit::new(vec![0, 0, 0, 1, 0x65, 0x88])
///     .with_pts(0)
///     .with_key_flag(true);
/// muxer.write_packet(&idr)?;
/// muxer.close()?;
/// # Ok(())
/// # }
/// ```
pub struct CachedSegmentMuxer {
    config: MuxerConfig,
    streams: Vec<StreamInfo>,
    encoder: TsEncoder,
    state: MuxerState,
    started: bool,
    current: Option<SegmentBuilder>,
    sequence: i64,
    next_start_ts: f64,
    force_boundary: bool,
    last_dts: Vec<Option<i64>>,
    last_video_dts: Option<i64>,
    video_dts_delta: i64,
    cache: Arc<SegmentCache>,
    stats: Arc<WriterStats>,
    writer_name: &'static str,
    worker: Option<JoinHandle<()>>,
}

impl CachedSegmentMuxer {
    /// Validates configuration and streams, selects the writer back-end by
    /// URL scheme, initializes it and starts the writer worker thread.
    pub fn open(
        config: MuxerConfig,
        streams: Vec<StreamInfo>,
        registry: &WriterRegistry,
    ) -> Result<Self> {
        config.validate()?;
        validate_streams(&streams)?;

        let url = Url::parse(&config.filename)
            .map_err(|e| CsegError::InvalidConfig(format!("bad filename URL: {}", e)))?;
        let (writer_name, mut plugin) =
            registry.create_for_scheme(url.scheme()).ok_or_else(|| {
                CsegError::InvalidConfig(format!("no writer for scheme {}", url.scheme()))
            })?;

        let encoder = TsEncoder::new(&streams)?;
        let ctx = WriterContext {
            filename: config.filename.clone(),
            url,
            timeout: config.writer_timeout,
        };
        plugin.init(&ctx)?;

        let cache = Arc::new(SegmentCache::new(
            config.max_nb_segments,
            config.pre_recording_time,
            config.nonblock,
        ));
        let stats = Arc::new(WriterStats::default());
        let worker = {
            let cache = Arc::clone(&cache);
            let stats = Arc::clone(&stats);
            let opts = WorkerOptions {
                drain_on_close: config.drain_on_close,
                pause_retry_interval: config.pause_retry_interval,
            };
            thread::Builder::new()
                .name("cseg-writer".to_string())
                .spawn(move || run_writer_worker(plugin, ctx, cache, stats, opts))?
        };

        let stream_count = streams.len();
        let mut muxer = Self {
            next_start_ts: config.start_ts,
            sequence: config.start_sequence,
            config,
            streams,
            encoder,
            state: MuxerState::Init,
            started: false,
            current: None,
            force_boundary: false,
            last_dts: vec![None; stream_count],
            last_video_dts: None,
            video_dts_delta: 0,
            cache,
            stats,
            writer_name,
            worker: Some(worker),
        };
        muxer.state = MuxerState::Open;
        info!(
            "cseg muxer opened: {} via {}, target {:.1}s, cache {}",
            muxer.config.filename, writer_name, muxer.config.segment_time, muxer.config.max_nb_segments
        );
        Ok(muxer)
    }

    /// Routes one access unit into the current segment, rotating segments on
    /// IDR boundaries.
    ///
    /// Access units arriving before the first video IDR are dropped
    /// silently. In blocking mode the call suspends while the cache is full
    /// and the pre-roll would be starved by an eviction.
    pub fn write_packet(&mut self, au: &AccessUnit) -> Result<()> {
        match self.write_packet_inner(au) {
            Err(err) if err.is_benign() => {
                trace!("dropping access unit before first IDR");
                Ok(())
            }
            other => other,
        }
    }

    fn write_packet_inner(&mut self, au: &AccessUnit) -> Result<()> {
        if matches!(self.state, MuxerState::Closing | MuxerState::Closed) {
            return Err(CsegError::ShuttingDown);
        }
        let stream = self.streams.get(au.stream_index).ok_or_else(|| {
            CsegError::InvalidInput(format!("stream index {} out of range", au.stream_index))
        })?;
        if au.data.is_empty() {
            return Err(CsegError::InvalidInput("empty access unit".to_string()));
        }
        let is_video = stream.kind == StreamKind::Video;
        let dts = au.effective_dts();
        if let Some(last) = self.last_dts[au.stream_index] {
            if dts < last {
                return Err(CsegError::InvalidInput(format!(
                    "non-monotonic DTS on stream {}: {} after {}",
                    au.stream_index, dts, last
                )));
            }
        }

        if !self.started {
            if !(is_video && au.is_key) {
                return Err(CsegError::NotStarted);
            }
            self.started = true;
            if self.next_start_ts < 0.0 {
                self.next_start_ts = wall_clock_seconds();
                debug!("start_ts latched from wall clock: {:.3}", self.next_start_ts);
            }
        }

        let estimate = self.encoder.estimate_au_size(au.data.len(), is_video);
        if estimate + PSI_BURST_SIZE > self.config.max_seg_size {
            return Err(CsegError::SegmentOverflow(format!(
                "access unit needs about {} bytes, segment cap is {}",
                estimate, self.config.max_seg_size
            )));
        }

        if let Some(current) = &self.current {
            if current.size() + estimate > self.config.max_seg_size && !self.force_boundary {
                debug!(
                    "segment {} at {} bytes would cross the size cap, boundary forced",
                    current.sequence,
                    current.size()
                );
                self.force_boundary = true;
            }
        }
        if is_video && au.is_key {
            if let Some(current) = &self.current {
                if current.elapsed(dts) >= self.config.segment_time || self.force_boundary {
                    self.rotate(dts)?;
                }
            }
        }
        if self.current.is_none() {
            self.open_segment(dts)?;
        }

        let current = self
            .current
            .as_mut()
            .expect("segment opened above");
        if is_video {
            self.encoder
                .write_video_au(current.chain_mut(), au.pts, dts, au.is_key, &au.data)?;
            if let Some(prev) = self.last_video_dts {
                if dts > prev {
                    self.video_dts_delta = dts - prev;
                }
            }
            self.last_video_dts = Some(dts);
        } else {
            self.encoder
                .write_audio_au(current.chain_mut(), au.pts, &au.data)?;
        }
        self.last_dts[au.stream_index] = Some(dts);
        self.state = MuxerState::Writing;
        Ok(())
    }

    /// Closes the current segment regardless of duration, signals the writer
    /// to stop, applies the drain policy and releases the back-end.
    /// Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.state == MuxerState::Closed {
            return Ok(());
        }
        self.state = MuxerState::Closing;

        if let Some(builder) = self.current.take() {
            if self.started && !builder.is_empty() {
                let next_dts = self
                    .last_video_dts
                    .map(|dts| dts + self.video_dts_delta)
                    .unwrap_or(builder.start_dts);
                let segment = Arc::new(builder.finish(next_dts));
                debug!(
                    "final segment {} closed: {:.3}s, {} bytes",
                    segment.sequence, segment.duration, segment.size
                );
                if !self.cache.enqueue_final(segment) {
                    warn!("cache already shut down, final segment dropped");
                }
            }
        }

        self.cache.shutdown();
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| CsegError::Internal("writer worker panicked".to_string()))?;
        }
        self.state = MuxerState::Closed;
        info!(
            "cseg muxer closed via {}: {} segments written, {} errors, {} evictions",
            self.writer_name,
            self.stats.segments_written(),
            self.stats.write_errors(),
            self.cache.evictions()
        );
        Ok(())
    }

    /// Current counters.
    pub fn stats(&self) -> MuxerStats {
        MuxerStats {
            segments_written: self.stats.segments_written(),
            write_errors: self.stats.write_errors(),
            evictions: self.cache.evictions(),
            cached_segments: self.cache.len(),
            cached_duration: self.cache.total_duration(),
        }
    }

    /// Current state of the writer worker.
    pub fn writer_state(&self) -> WriterState {
        self.stats.state()
    }

    fn open_segment(&mut self, start_dts: i64) -> Result<()> {
        let mut builder = SegmentBuilder::new(self.sequence, self.next_start_ts, start_dts);
        self.sequence += 1;
        self.encoder.write_psi(builder.chain_mut())?;
        debug!(
            "segment {} opened at dts {} (start_ts {:.3})",
            builder.sequence, start_dts, builder.start_ts
        );
        self.current = Some(builder);
        Ok(())
    }

    fn rotate(&mut self, next_dts: i64) -> Result<()> {
        let builder = self.current.take().expect("rotate with an open segment");
        let segment = Arc::new(builder.finish(next_dts));
        self.next_start_ts = segment.start_ts + segment.duration;
        self.force_boundary = false;
        debug!(
            "segment {} closed: {:.3}s, {} bytes",
            segment.sequence, segment.duration, segment.size
        );
        match self.cache.enqueue(segment) {
            EnqueueOutcome::Stored | EnqueueOutcome::EvictedOldest(_) => Ok(()),
            EnqueueOutcome::ShuttingDown => Err(CsegError::ShuttingDown),
        }
    }
}

impl Drop for CachedSegmentMuxer {
    fn drop(&mut self) {
        if self.state != MuxerState::Closed {
            if let Err(err) = self.close() {
                warn!("close on drop failed: {}", err);
            }
        }
    }
}

fn validate_streams(streams: &[StreamInfo]) -> Result<()> {
    let video_count = streams
        .iter()
        .filter(|s| s.kind == StreamKind::Video)
        .count();
    if video_count != 1 {
        return Err(CsegError::InvalidConfig(format!(
            "exactly one video stream required, got {}",
            video_count
        )));
    }
    let audio_count = streams
        .iter()
        .filter(|s| s.kind == StreamKind::Audio)
        .count();
    if audio_count > 1 {
        return Err(CsegError::InvalidConfig(format!(
            "at most one audio stream supported, got {}",
            audio_count
        )));
    }
    for (index, stream) in streams.iter().enumerate() {
        if !stream.is_consistent() {
            return Err(CsegError::InvalidConfig(format!(
                "stream {} kind does not match its codec",
                index
            )));
        }
    }
    Ok(())
}

fn wall_clock_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::cseg::Segment;
    use crate::writer::{SegmentWriter, WriteStatus};
    use std::sync::Mutex;

    /// Collects `(sequence, start_ts, duration, size)` of everything written.
    #[derive(Clone, Default)]
    struct Capture {
        records: Arc<Mutex<Vec<(i64, f64, f64, usize)>>>,
    }

    struct CaptureWriter(Capture);

    impl SegmentWriter for CaptureWriter {
        fn write_segment(&mut self, _ctx: &WriterContext, segment: &Segment) -> Result<WriteStatus> {
            self.0.records.lock().unwrap().push((
                segment.sequence,
                segment.start_ts,
                segment.duration,
                segment.size,
            ));
            Ok(WriteStatus::Done)
        }
    }

    fn capture_registry(capture: &Capture) -> WriterRegistry {
        let mut registry = WriterRegistry::new();
        let capture = capture.clone();
        registry.register("capture_writer", &["cap"], move || {
            Box::new(CaptureWriter(capture.clone()))
        });
        registry
    }

    fn video_au(dts: i64, idr: bool, len: usize) -> AccessUnit {
        AccessUnit::new(vec![0x41u8; len])
            .with_stream_index(0)
            .with_pts(dts)
            .with_key_flag(idr)
    }

    #[test]
    fn test_open_rejects_bad_streams() {
        let registry = WriterRegistry::with_builtin_writers();
        let config = MuxerConfig::new("dummy://x");
        assert!(matches!(
            CachedSegmentMuxer::open(config.clone(), vec![], &registry),
            Err(CsegError::InvalidConfig(_))
        ));
        let two_audio = vec![
            StreamInfo::video_h264(),
            StreamInfo::audio_aac(48_000, 2),
            StreamInfo::audio_aac(44_100, 2),
        ];
        assert!(CachedSegmentMuxer::open(config, two_audio, &registry).is_err());
    }

    #[test]
    fn test_open_rejects_unknown_scheme() {
        let registry = WriterRegistry::with_builtin_writers();
        let config = MuxerConfig::new("ftp://host/path");
        let result = CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry);
        assert!(matches!(result, Err(CsegError::InvalidConfig(_))));
    }

    #[test]
    fn test_drops_until_first_idr() {
        let capture = Capture::default();
        let registry = capture_registry(&capture);
        let config = MuxerConfig::new("cap://x").with_start_ts(0.0);
        let mut muxer =
            CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry).unwrap();

        // non-IDR packets before the stream starts are dropped, not errors
        muxer.write_packet(&video_au(0, false, 100)).unwrap();
        muxer.write_packet(&video_au(3_000, false, 100)).unwrap();
        assert!(muxer.current.is_none());

        muxer.write_packet(&video_au(6_000, true, 100)).unwrap();
        assert!(muxer.current.is_some());
        muxer.close().unwrap();

        let records = capture.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, 0);
    }

    #[test]
    fn test_segment_rotation_and_timing() {
        let capture = Capture::default();
        let registry = capture_registry(&capture);
        let config = MuxerConfig::new("cap://x")
            .with_segment_time(1.0)
            .with_start_ts(50.0)
            .with_max_nb_segments(8);
        let mut muxer =
            CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry).unwrap();

        // 10 fps, IDR every 5 frames, 2.5 seconds of stream
        for frame in 0..25i64 {
            let dts = frame * 9_000;
            muxer
                .write_packet(&video_au(dts, frame % 5 == 0, 300))
                .unwrap();
        }
        muxer.close().unwrap();

        let records = capture.records.lock().unwrap();
        let sequences: Vec<i64> = records.iter().map(|r| r.0).collect();
        assert_eq!(sequences, vec![0, 1, 2]);

        // piecewise-constant start_ts chain
        assert!((records[0].1 - 50.0).abs() < 1e-6);
        for pair in records.windows(2) {
            let expected = pair[0].1 + pair[0].2;
            assert!((pair[1].1 - expected).abs() < 1e-6);
        }
        // boundaries land on IDRs at whole seconds
        assert!((records[0].2 - 1.0).abs() < 1e-9);
        assert!((records[1].2 - 1.0).abs() < 1e-9);
        // final partial segment: 5 frames minus none, closed by close()
        assert!((records[2].2 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_non_monotonic_dts() {
        let capture = Capture::default();
        let registry = capture_registry(&capture);
        let config = MuxerConfig::new("cap://x").with_start_ts(0.0);
        let mut muxer =
            CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry).unwrap();
        muxer.write_packet(&video_au(9_000, true, 100)).unwrap();
        let result = muxer.write_packet(&video_au(0, false, 100));
        assert!(matches!(result, Err(CsegError::InvalidInput(_))));
        muxer.close().unwrap();
    }

    #[test]
    fn test_segment_overflow() {
        let capture = Capture::default();
        let registry = capture_registry(&capture);
        let config = MuxerConfig::new("cap://x")
            .with_start_ts(0.0)
            .with_max_seg_size(64 * 1024);
        let mut muxer =
            CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry).unwrap();

        let result = muxer.write_packet(&video_au(0, true, 128 * 1024));
        assert!(matches!(result, Err(CsegError::SegmentOverflow(_))));
        muxer.close().unwrap();
        assert!(capture.records.lock().unwrap().is_empty());
    }

    #[test]
    fn test_size_cap_forces_boundary_at_next_idr() {
        let capture = Capture::default();
        let registry = capture_registry(&capture);
        let config = MuxerConfig::new("cap://x")
            .with_start_ts(0.0)
            .with_segment_time(1_000.0) // duration never triggers
            .with_max_seg_size(200 * 1024)
            .with_max_nb_segments(8);
        let mut muxer =
            CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry).unwrap();

        // ~47 KiB per IDR frame: four fit under the cap, the fifth forces a
        // boundary and opens the next segment
        for frame in 0..8i64 {
            muxer
                .write_packet(&video_au(frame * 3_000, true, 47 * 1024))
                .unwrap();
        }
        muxer.close().unwrap();

        let records = capture.records.lock().unwrap();
        assert_eq!(records.len(), 2, "size cap never forced a boundary");
        assert!(records.iter().all(|r| r.3 <= 200 * 1024));
    }

    #[test]
    fn test_write_after_close() {
        let capture = Capture::default();
        let registry = capture_registry(&capture);
        let config = MuxerConfig::new("cap://x").with_start_ts(0.0);
        let mut muxer =
            CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry).unwrap();
        muxer.write_packet(&video_au(0, true, 100)).unwrap();
        muxer.close().unwrap();
        assert!(matches!(
            muxer.write_packet(&video_au(3_000, false, 100)),
            Err(CsegError::ShuttingDown)
        ));
        // close is idempotent
        muxer.close().unwrap();
    }

    #[test]
    fn test_invalid_stream_index() {
        let capture = Capture::default();
        let registry = capture_registry(&capture);
        let config = MuxerConfig::new("cap://x").with_start_ts(0.0);
        let mut muxer =
            CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry).unwrap();
        let au = video_au(0, true, 100).with_stream_index(3);
        assert!(matches!(
            muxer.write_packet(&au),
            Err(CsegError::InvalidInput(_))
        ));
        muxer.close().unwrap();
    }
}
