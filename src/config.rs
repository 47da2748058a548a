//! # Muxer Configuration
//!
//! [`MuxerConfig`] carries every knob of the cached segment muxer. Options
//! can be set through the builder methods or from textual `key=value` pairs
//! with [`MuxerConfig::set_option`], using the same option names the muxer
//! has always been driven by (`cseg_time`, `cseg_list_size`, ...).
//!
//! ## Example Usage
//!
//! ```rust
//! use cseg::config::MuxerConfig;
//!
//! let mut config = MuxerConfig::new("file:///tmp/recorder")
//!     .with_segment_time(4.0)
//!     .with_max_nb_segments(5);
//! config.set_option("cseg_seg_size", "4194304").unwrap();
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use crate::error::{CsegError, Result};

/// Default target segment duration, seconds.
pub const DEFAULT_SEGMENT_TIME: f64 = 10.0;
/// Default cache capacity in segments.
pub const DEFAULT_LIST_SIZE: usize = 3;
/// Default per-segment size cap, bytes (10 MiB).
pub const DEFAULT_SEG_SIZE: usize = 10_485_760;
/// Default writer I/O budget.
pub const DEFAULT_WRITER_TIMEOUT: Duration = Duration::from_secs(30);
/// Default sleep between retries of a paused writer.
pub const DEFAULT_PAUSE_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Complete configuration of a cached segment muxer.
#[derive(Debug, Clone)]
pub struct MuxerConfig {
    /// Destination URL; the scheme selects the writer back-end
    pub filename: String,
    /// Sequence number of the first segment
    pub start_sequence: i64,
    /// Target segment duration, seconds
    pub segment_time: f64,
    /// Cache capacity in segments, at least 1
    pub max_nb_segments: usize,
    /// Hard cap on one segment's size, bytes
    pub max_seg_size: usize,
    /// Wall-clock start of the first segment, seconds; negative latches the
    /// clock at the first IDR
    pub start_ts: f64,
    /// Minimum retained duration while the writer is behind, seconds
    pub pre_recording_time: f64,
    /// Per-call writer I/O budget
    pub writer_timeout: Duration,
    /// Evict the oldest segment instead of blocking the producer
    pub nonblock: bool,
    /// Give every cached segment one attempt at close instead of discarding
    pub drain_on_close: bool,
    /// Sleep between retries of a paused writer
    pub pause_retry_interval: Duration,
}

impl MuxerConfig {
    /// Creates a configuration for `filename` with the default option values.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            start_sequence: 0,
            segment_time: DEFAULT_SEGMENT_TIME,
            max_nb_segments: DEFAULT_LIST_SIZE,
            max_seg_size: DEFAULT_SEG_SIZE,
            start_ts: -1.0,
            pre_recording_time: 0.0,
            writer_timeout: DEFAULT_WRITER_TIMEOUT,
            nonblock: false,
            drain_on_close: true,
            pause_retry_interval: DEFAULT_PAUSE_RETRY_INTERVAL,
        }
    }

    /// Sets the first sequence number.
    pub fn with_start_sequence(mut self, sequence: i64) -> Self {
        self.start_sequence = sequence;
        self
    }

    /// Sets the target segment duration in seconds.
    pub fn with_segment_time(mut self, seconds: f64) -> Self {
        self.segment_time = seconds;
        self
    }

    /// Sets the cache capacity in segments.
    pub fn with_max_nb_segments(mut self, count: usize) -> Self {
        self.max_nb_segments = count;
        self
    }

    /// Sets the per-segment size cap in bytes.
    pub fn with_max_seg_size(mut self, bytes: usize) -> Self {
        self.max_seg_size = bytes;
        self
    }

    /// Sets the wall-clock start of the first segment.
    pub fn with_start_ts(mut self, seconds: f64) -> Self {
        self.start_ts = seconds;
        self
    }

    /// Sets the minimum retained duration in seconds.
    pub fn with_pre_recording_time(mut self, seconds: f64) -> Self {
        self.pre_recording_time = seconds;
        self
    }

    /// Sets the writer I/O budget.
    pub fn with_writer_timeout(mut self, timeout: Duration) -> Self {
        self.writer_timeout = timeout;
        self
    }

    /// Selects the full-cache policy: evict oldest instead of blocking.
    pub fn with_nonblock(mut self, nonblock: bool) -> Self {
        self.nonblock = nonblock;
        self
    }

    /// Selects the close-time drain policy.
    pub fn with_drain_on_close(mut self, drain: bool) -> Self {
        self.drain_on_close = drain;
        self
    }

    /// Sets the sleep between retries of a paused writer.
    pub fn with_pause_retry_interval(mut self, interval: Duration) -> Self {
        self.pause_retry_interval = interval;
        self
    }

    /// Applies one textual option.
    ///
    /// Recognized keys: `start_number`, `cseg_time`, `cseg_list_size`,
    /// `cseg_seg_size`, `start_ts`, `cseg_cache_time`, `writer_timeout`
    /// (seconds), `cseg_flags` (`nonblock` or `+nonblock`), `drain_on_close`.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "start_number" => self.start_sequence = parse(key, value)?,
            "cseg_time" => self.segment_time = parse(key, value)?,
            "cseg_list_size" => self.max_nb_segments = parse(key, value)?,
            "cseg_seg_size" => self.max_seg_size = parse(key, value)?,
            "start_ts" => self.start_ts = parse(key, value)?,
            "cseg_cache_time" => self.pre_recording_time = parse(key, value)?,
            "writer_timeout" => {
                let seconds: u64 = parse(key, value)?;
                self.writer_timeout = Duration::from_secs(seconds);
            }
            "cseg_flags" => {
                for flag in value.split('+').filter(|f| !f.is_empty()) {
                    match flag {
                        "nonblock" => self.nonblock = true,
                        other => {
                            return Err(CsegError::InvalidConfig(format!(
                                "unknown cseg_flags value: {}",
                                other
                            )))
                        }
                    }
                }
            }
            "drain_on_close" => self.drain_on_close = parse(key, value)?,
            other => {
                return Err(CsegError::InvalidConfig(format!(
                    "unknown option: {}",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Checks option values for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.filename.is_empty() {
            return Err(CsegError::InvalidConfig("filename absent".to_string()));
        }
        if self.max_nb_segments < 1 {
            return Err(CsegError::InvalidConfig(
                "cseg_list_size must be at least 1".to_string(),
            ));
        }
        if !(self.segment_time > 0.0) {
            return Err(CsegError::InvalidConfig(
                "cseg_time must be positive".to_string(),
            ));
        }
        if self.max_seg_size == 0 {
            return Err(CsegError::InvalidConfig(
                "cseg_seg_size must be positive".to_string(),
            ));
        }
        if self.pre_recording_time < 0.0 {
            return Err(CsegError::InvalidConfig(
                "cseg_cache_time must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        CsegError::InvalidConfig(format!("bad value for {}: {}", key, value))
    })
}
