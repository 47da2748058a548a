#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use pretty_assertions::assert_eq;

    use cseg::av::{AccessUnit, StreamInfo};
    use cseg::config::MuxerConfig;
    use cseg::error::{CsegError, Result};
    use cseg::format::cseg::{CachedSegmentMuxer, Segment, WriterState};
    use cseg::format::ts::TS_PACKET_SIZE;
    use cseg::utils::Crc32Mpeg2;
    use cseg::writer::{SegmentWriter, WriteStatus, WriterContext, WriterRegistry};

    const PID_PAT: u16 = 0x0000;
    const PID_PMT: u16 = 0x0FF0;
    const PID_VIDEO: u16 = 0x1000;
    const PID_AUDIO: u16 = 0x1001;

    const FPS: i64 = 30;
    const FRAME_TICKS: i64 = 90_000 / FPS;

    // ---------------------------------------------------------------
    // test writer collecting everything the worker delivers
    // ---------------------------------------------------------------

    #[derive(Debug, Clone)]
    struct DeliveredSegment {
        sequence: i64,
        start_ts: f64,
        start_dts: i64,
        next_dts: i64,
        duration: f64,
        size: usize,
        bytes: Vec<u8>,
    }

    #[derive(Clone, Default)]
    struct Collector {
        delivered: Arc<Mutex<Vec<DeliveredSegment>>>,
        calls: Arc<AtomicU64>,
        /// milliseconds to sleep inside each write
        delay: Arc<AtomicU64>,
        /// leading `Pause` results before the first success per segment run
        pauses_left: Arc<AtomicU64>,
    }

    impl Collector {
        fn delivered_sequences(&self) -> Vec<i64> {
            self.delivered.lock().unwrap().iter().map(|s| s.sequence).collect()
        }

        fn wait_delivered(&self, count: usize, timeout: Duration) -> bool {
            let deadline = Instant::now() + timeout;
            while Instant::now() < deadline {
                if self.delivered.lock().unwrap().len() >= count {
                    return true;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            false
        }
    }

    struct CollectingWriter(Collector);

    impl SegmentWriter for CollectingWriter {
        fn write_segment(&mut self, _ctx: &WriterContext, segment: &Segment) -> Result<WriteStatus> {
            self.0.calls.fetch_add(1, Ordering::SeqCst);
            if self.0.pauses_left.load(Ordering::SeqCst) > 0 {
                self.0.pauses_left.fetch_sub(1, Ordering::SeqCst);
                return Ok(WriteStatus::Pause);
            }
            let delay = self.0.delay.load(Ordering::SeqCst);
            if delay > 0 {
                std::thread::sleep(Duration::from_millis(delay));
            }
            let bytes: Vec<u8> = segment.fragments().flatten().copied().collect();
            self.0.delivered.lock().unwrap().push(DeliveredSegment {
                sequence: segment.sequence,
                start_ts: segment.start_ts,
                start_dts: segment.start_dts,
                next_dts: segment.next_dts,
                duration: segment.duration,
                size: segment.size,
                bytes,
            });
            Ok(WriteStatus::Done)
        }
    }

    fn collector_registry(collector: &Collector) -> WriterRegistry {
        let mut registry = WriterRegistry::new();
        let collector = collector.clone();
        registry.register("collecting_writer", &["collect"], move || {
            Box::new(CollectingWriter(collector.clone()))
        });
        registry
    }

    // ---------------------------------------------------------------
    // stream feeding helpers
    // ---------------------------------------------------------------

    fn video_frame(frame: i64, idr: bool) -> AccessUnit {
        // a representative Annex-B access unit, big enough to span packets
        let nal_type: u8 = if idr { 0x65 } else { 0x41 };
        let mut data = vec![0x00, 0x00, 0x00, 0x01, nal_type];
        data.extend(std::iter::repeat(0xA5).take(900));
        AccessUnit::new(data)
            .with_stream_index(0)
            .with_pts(frame * FRAME_TICKS)
            .with_key_flag(idr)
    }

    fn audio_frame(pts: i64) -> AccessUnit {
        AccessUnit::new(vec![0x21; 340]).with_stream_index(1).with_pts(pts)
    }

    /// Feeds `seconds` of 30 fps video with an IDR every `idr_every` frames.
    fn feed_video(muxer: &mut CachedSegmentMuxer, seconds: i64, idr_every: i64) {
        for frame in 0..seconds * FPS {
            let idr = frame % idr_every == 0;
            muxer.write_packet(&video_frame(frame, idr)).unwrap();
        }
    }

    // ---------------------------------------------------------------
    // TS inspection helpers
    // ---------------------------------------------------------------

    fn packets(data: &[u8]) -> Vec<&[u8]> {
        assert_eq!(data.len() % TS_PACKET_SIZE, 0, "output not packet aligned");
        data.chunks(TS_PACKET_SIZE).collect()
    }

    fn pid(packet: &[u8]) -> u16 {
        (((packet[1] & 0x1F) as u16) << 8) | packet[2] as u16
    }

    fn payload_unit_start(packet: &[u8]) -> bool {
        packet[1] & 0x40 != 0
    }

    fn continuity_counter(packet: &[u8]) -> u8 {
        packet[3] & 0x0F
    }

    fn has_adaptation_field(packet: &[u8]) -> bool {
        packet[3] & 0x20 != 0
    }

    fn random_access(packet: &[u8]) -> bool {
        has_adaptation_field(packet) && packet[4] > 0 && packet[5] & 0x40 != 0
    }

    fn check_continuity(all_bytes: &[u8]) {
        let mut last: HashMap<u16, u8> = HashMap::new();
        for packet in packets(all_bytes) {
            assert_eq!(packet[0], 0x47, "lost sync");
            let pid = pid(packet);
            let cc = continuity_counter(packet);
            if let Some(prev) = last.insert(pid, cc) {
                assert_eq!(
                    cc,
                    (prev + 1) & 0x0F,
                    "continuity break on PID {:#06x}",
                    pid
                );
            }
        }
    }

    // ---------------------------------------------------------------
    // scenarios
    // ---------------------------------------------------------------

    /// Happy path through the file writer: steady 30 fps stream, 2 second
    /// segments, clean close. Four files land on disk with the expected
    /// durations.
    #[test]
    fn test_happy_path_file_writer() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("rec");
        let registry = WriterRegistry::with_builtin_writers();
        let config = MuxerConfig::new(format!("file://{}", prefix.display()))
            .with_segment_time(2.0)
            .with_max_nb_segments(3)
            .with_start_ts(0.0);
        let mut muxer =
            CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry).unwrap();

        // 7 seconds, IDR twice a second so boundaries land exactly on 2s
        feed_video(&mut muxer, 7, 15);
        muxer.close().unwrap();

        let mut sizes = Vec::new();
        for sequence in 0..4 {
            let path = dir.path().join(format!("rec_{}.ts", sequence));
            let data = std::fs::read(&path)
                .unwrap_or_else(|_| panic!("missing segment file {}", sequence));
            assert_eq!(data.len() % TS_PACKET_SIZE, 0);
            assert_eq!(data[0], 0x47);
            sizes.push(data.len());
        }
        assert!(!dir.path().join("rec_4.ts").exists());
        // three full segments carry twice the frames of the final one
        assert!(sizes[0] > sizes[3]);
    }

    /// The wire format holds up across segments: packet alignment, PSI at
    /// every segment start, IDR random-access marking, CRC round-trips and
    /// per-PID continuity across the whole recording.
    #[test]
    fn test_ts_invariants_across_segments() {
        let collector = Collector::default();
        let registry = collector_registry(&collector);
        let config = MuxerConfig::new("collect://x")
            .with_segment_time(1.0)
            .with_max_nb_segments(16)
            .with_start_ts(10.0);
        let streams = vec![StreamInfo::video_h264(), StreamInfo::audio_aac(48_000, 2)];
        let mut muxer = CachedSegmentMuxer::open(config, streams, &registry).unwrap();

        for frame in 0..90i64 {
            muxer
                .write_packet(&video_frame(frame, frame % 15 == 0))
                .unwrap();
            if frame % 2 == 0 {
                muxer.write_packet(&audio_frame(frame * FRAME_TICKS)).unwrap();
            }
        }
        muxer.close().unwrap();

        let delivered = collector.delivered.lock().unwrap().clone();
        assert!(delivered.len() >= 3);

        let crc = Crc32Mpeg2::new();
        for segment in &delivered {
            let pkts = packets(&segment.bytes);
            // PSI burst leads the segment
            assert_eq!(pid(pkts[0]), PID_PAT);
            assert_eq!(pid(pkts[1]), PID_PMT);
            for psi in &pkts[0..2] {
                assert!(payload_unit_start(psi));
                let section_len =
                    3 + ((((psi[6] & 0x0F) as usize) << 8) | psi[7] as usize);
                assert!(crc.verify(&psi[5..5 + section_len]), "PSI CRC mismatch");
            }
            // the first media packet is an IDR video packet with RAI
            let first_media = pkts[2];
            assert_eq!(pid(first_media), PID_VIDEO);
            assert!(payload_unit_start(first_media));
            assert!(random_access(first_media), "segment must start on an IDR");
            // segment body uses only the expected PIDs
            for pkt in &pkts {
                assert!(
                    [PID_PAT, PID_PMT, PID_VIDEO, PID_AUDIO].contains(&pid(pkt)),
                    "unexpected PID {:#06x}",
                    pid(pkt)
                );
            }
            assert_eq!(segment.size, segment.bytes.len());
        }

        // continuity counters survive segment boundaries
        let concatenated: Vec<u8> = delivered
            .iter()
            .flat_map(|s| s.bytes.iter().copied())
            .collect();
        check_continuity(&concatenated);

        // FIFO delivery in strictly increasing sequence
        let sequences: Vec<i64> = delivered.iter().map(|s| s.sequence).collect();
        let mut sorted = sequences.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sequences, sorted);

        // adjacent segments tile the timestamp domain
        for pair in delivered.windows(2) {
            assert_eq!(pair[1].start_dts, pair[0].next_dts);
            let expected = pair[0].start_ts + pair[0].duration;
            assert!((pair[1].start_ts - expected).abs() < 1e-6);
        }
        assert!((delivered[0].start_ts - 10.0).abs() < 1e-9);
    }

    /// An access unit that cannot fit under the size cap fails with
    /// `SegmentOverflow` and enqueues nothing.
    #[test]
    fn test_size_cap_overflow() {
        let collector = Collector::default();
        let registry = collector_registry(&collector);
        let config = MuxerConfig::new("collect://x")
            .with_start_ts(0.0)
            .with_max_seg_size(10_485_760);
        let mut muxer =
            CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry).unwrap();

        let huge = AccessUnit::new(vec![0x41; 12 * 1024 * 1024])
            .with_stream_index(0)
            .with_pts(0)
            .with_key_flag(true);
        assert!(matches!(
            muxer.write_packet(&huge),
            Err(CsegError::SegmentOverflow(_))
        ));
        muxer.close().unwrap();
        assert!(collector.delivered_sequences().is_empty());
    }

    /// Blocking backpressure: with a single-slot cache and a slow writer the
    /// producer stalls in the enqueue until the slot frees.
    #[test]
    fn test_blocking_backpressure() {
        let collector = Collector::default();
        collector.delay.store(400, Ordering::SeqCst);
        let registry = collector_registry(&collector);
        let config = MuxerConfig::new("collect://x")
            .with_segment_time(1.0)
            .with_max_nb_segments(1)
            .with_pre_recording_time(0.0)
            .with_start_ts(0.0);
        let mut muxer =
            CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry).unwrap();

        // segment 0 is enqueued by the rotation on the IDR at 1s
        for frame in 0..=FPS {
            muxer
                .write_packet(&video_frame(frame, frame % FPS == 0))
                .unwrap();
        }
        // give the worker time to take segment 0 into its write call
        std::thread::sleep(Duration::from_millis(100));

        // the next rotation finds the slot still occupied and must wait
        let blocked_at = Instant::now();
        for frame in FPS + 1..=2 * FPS {
            muxer
                .write_packet(&video_frame(frame, frame % FPS == 0))
                .unwrap();
        }
        let blocked_for = blocked_at.elapsed();
        assert!(
            blocked_for >= Duration::from_millis(200),
            "producer was not backpressured (blocked {:?})",
            blocked_for
        );

        muxer.close().unwrap();
        let sequences = collector.delivered_sequences();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    /// Non-blocking mode: the producer never stalls, the oldest segments are
    /// evicted instead, and the writer sees the survivors in order.
    #[test]
    fn test_nonblock_eviction() {
        let collector = Collector::default();
        collector.delay.store(300, Ordering::SeqCst);
        let registry = collector_registry(&collector);
        let config = MuxerConfig::new("collect://x")
            .with_segment_time(1.0)
            .with_max_nb_segments(1)
            .with_nonblock(true)
            .with_start_ts(0.0);
        let mut muxer =
            CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry).unwrap();

        // first segment; let the worker pick it up
        for frame in 0..=FPS {
            muxer
                .write_packet(&video_frame(frame, frame % FPS == 0))
                .unwrap();
        }
        std::thread::sleep(Duration::from_millis(100));

        // two more rotations while the writer sleeps: both enqueue instantly
        let producing = Instant::now();
        for frame in FPS + 1..=3 * FPS {
            muxer
                .write_packet(&video_frame(frame, frame % FPS == 0))
                .unwrap();
        }
        assert!(
            producing.elapsed() < Duration::from_millis(200),
            "producer must never block in nonblock mode"
        );

        // segment 0 (in flight) and segment 2 survive; segment 1 was evicted
        assert!(collector.wait_delivered(2, Duration::from_secs(5)));
        let stats = muxer.stats();
        assert_eq!(stats.evictions, 2);
        assert_eq!(collector.delivered_sequences(), vec![0, 2]);
        muxer.close().unwrap();
    }

    /// Writer pause: the segment stays cached across pauses and is written
    /// exactly once after the writer recovers.
    #[test]
    fn test_writer_pause_retry() {
        let collector = Collector::default();
        collector.pauses_left.store(3, Ordering::SeqCst);
        let registry = collector_registry(&collector);
        let config = MuxerConfig::new("collect://x")
            .with_segment_time(1.0)
            .with_max_nb_segments(4)
            .with_pause_retry_interval(Duration::from_millis(30))
            .with_start_ts(0.0);
        let mut muxer =
            CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry).unwrap();

        for frame in 0..=FPS {
            muxer
                .write_packet(&video_frame(frame, frame % FPS == 0))
                .unwrap();
        }

        assert!(collector.wait_delivered(1, Duration::from_secs(5)));
        // three pauses plus the final success
        assert_eq!(collector.calls.load(Ordering::SeqCst), 4);
        assert_eq!(collector.delivered_sequences(), vec![0]);
        assert_eq!(muxer.stats().write_errors, 0);
        muxer.close().unwrap();
    }

    /// The worker flag is observable: paused while the back-end refuses,
    /// stopped after close.
    #[test]
    fn test_writer_state_flag() {
        let collector = Collector::default();
        collector.pauses_left.store(1_000, Ordering::SeqCst);
        let registry = collector_registry(&collector);
        let config = MuxerConfig::new("collect://x")
            .with_segment_time(1.0)
            .with_max_nb_segments(4)
            .with_pause_retry_interval(Duration::from_millis(10))
            .with_start_ts(0.0)
            .with_drain_on_close(false);
        let mut muxer =
            CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry).unwrap();

        for frame in 0..=FPS {
            muxer
                .write_packet(&video_frame(frame, frame % FPS == 0))
                .unwrap();
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while muxer.writer_state() != WriterState::Paused && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(muxer.writer_state(), WriterState::Paused);
        assert_eq!(muxer.stats().cached_segments, 1);

        muxer.close().unwrap();
        assert_eq!(muxer.writer_state(), WriterState::Stopped);
    }

    /// Clean shutdown under load: close drains every cached segment with one
    /// attempt each and returns in bounded time.
    #[test]
    fn test_clean_shutdown_under_load() {
        let collector = Collector::default();
        collector.delay.store(50, Ordering::SeqCst);
        let registry = collector_registry(&collector);
        let config = MuxerConfig::new("collect://x")
            .with_segment_time(1.0)
            .with_max_nb_segments(16)
            .with_writer_timeout(Duration::from_millis(500))
            .with_start_ts(0.0);
        let mut muxer =
            CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry).unwrap();

        // ten 1-second segments, the last closed by close()
        feed_video(&mut muxer, 10, FPS);

        let closing = Instant::now();
        muxer.close().unwrap();
        let close_took = closing.elapsed();

        assert_eq!(
            collector.delivered_sequences(),
            (0..10).collect::<Vec<i64>>()
        );
        // bounded by the in-flight write plus one 50 ms attempt per segment
        assert!(
            close_took < Duration::from_secs(2),
            "close took {:?}",
            close_took
        );
        assert_eq!(muxer.stats().write_errors, 0);
    }

    /// Discard-on-close drops cached segments without invoking the writer.
    #[test]
    fn test_discard_on_close() {
        let collector = Collector::default();
        collector.delay.store(300, Ordering::SeqCst);
        let registry = collector_registry(&collector);
        let config = MuxerConfig::new("collect://x")
            .with_segment_time(1.0)
            .with_max_nb_segments(8)
            .with_drain_on_close(false)
            .with_start_ts(0.0);
        let mut muxer =
            CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry).unwrap();

        feed_video(&mut muxer, 4, FPS);
        muxer.close().unwrap();

        // at most the in-flight segment was written, the rest was dropped
        assert!(collector.delivered_sequences().len() <= 1);
    }

    /// Pre-roll retention: with cache time configured, a full ring evicts
    /// old segments as long as the retained duration stays above the
    /// minimum.
    #[test]
    fn test_preroll_eviction_in_blocking_mode() {
        let collector = Collector::default();
        // a pause-forever writer simulates a long outage
        collector.pauses_left.store(1_000_000, Ordering::SeqCst);
        let registry = collector_registry(&collector);
        let config = MuxerConfig::new("collect://x")
            .with_segment_time(1.0)
            .with_max_nb_segments(3)
            .with_pre_recording_time(2.0)
            .with_pause_retry_interval(Duration::from_millis(10))
            .with_start_ts(0.0)
            .with_drain_on_close(false);
        let mut muxer =
            CachedSegmentMuxer::open(config, vec![StreamInfo::video_h264()], &registry).unwrap();

        // 6 one-second segments into a 3-slot ring: the ring stays full and
        // keeps at least 2 seconds of pre-roll, evicting the overflow
        let feeding = Instant::now();
        feed_video(&mut muxer, 7, FPS);
        assert!(
            feeding.elapsed() < Duration::from_secs(2),
            "producer blocked despite satisfiable pre-roll"
        );
        let stats = muxer.stats();
        assert_eq!(stats.cached_segments, 3);
        assert!(stats.cached_duration >= 2.0);
        assert!(stats.evictions >= 3);
        muxer.close().unwrap();
    }
}
