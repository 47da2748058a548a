//! # Audio/Video Core Types
//!
//! This module provides the input-side types of the muxer: the access units
//! handed to [`write_packet`](crate::format::cseg::CachedSegmentMuxer::write_packet)
//! and the stream descriptors registered at open time.
//!
//! Timestamps are integers on the 90 kHz MPEG-TS clock. Video payloads are
//! Annex-B NAL units; AAC payloads are raw frames (the muxer synthesizes the
//! ADTS framing) unless the stream is declared as
//! [`CodecType::AacWithAdts`].
//!
//! ## Example Usage
//!
//! ```rust
//! use cseg::av::{AccessUnit, StreamInfo};
//!
//! let streams = vec![
//!     StreamInfo::video_h264(),
//!     StreamInfo::audio_aac(48_000, 2),
//! ];
//!
//! let au = AccessUnit::new(vec![0, 0, 0, 1, 0x65, 0x88])
//!     .with_stream_index(0)
//!     .with_pts(90_000)
//!     .with_key_flag(true);
//! assert!(au.is_key);
//! assert_eq!(streams.len(), 2);
//! ```

/// Supported codec types for audio and video streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecType {
    /// H.264/AVC video codec, Annex-B byte stream
    H264,
    /// Advanced Audio Coding (AAC), raw frames
    Aac,
    /// AAC frames that already carry their ADTS header
    AacWithAdts,
}

impl CodecType {
    /// Whether this codec is a video codec.
    pub fn is_video(&self) -> bool {
        matches!(self, CodecType::H264)
    }

    /// Whether this codec is an audio codec.
    pub fn is_audio(&self) -> bool {
        matches!(self, CodecType::Aac | CodecType::AacWithAdts)
    }
}

/// Kind of an elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Video elementary stream
    Video,
    /// Audio elementary stream
    Audio,
}

/// Media packet (access unit) handling and management
pub mod packet;
pub use packet::AccessUnit;

/// Stream descriptors registered with the muxer
pub mod stream;
pub use stream::StreamInfo;

/// Clock rate of PTS/DTS timestamps accepted by the muxer.
pub const TS_TIME_BASE: i64 = 90_000;
