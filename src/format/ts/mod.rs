//! # MPEG Transport Stream (TS) Encoding
//!
//! This module implements the wire-format half of the muxer: turning
//! validated access units into IEC 13818-1 transport packets.
//!
//! ## Core Features
//!
//! - **PSI tables**: single-program PAT/PMT with MPEG-2 CRC32
//! - **PES framing**: PTS/DTS timestamps, AU delimiters, ADTS synthesis
//! - **Packetization**: PCR insertion, random access marking,
//!   adaptation-field stuffing, per-PID continuity counters
//!
//! The fixed PID layout is PAT on 0, PMT on `0x0FF0`, video on `0x1000`
//! and audio on `0x1001`.
//!
//! ## Example Usage
//!
//! ```rust
//! use cseg::av::StreamInfo;
//! use cseg::format::ts::{TsEncoder, TS_PACKET_SIZE};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let streams = vec![StreamInfo::video_h264()];
//! let mut encoder = TsEncoder::new(&streams)?;
//!
//! let mut out = Vec::new();
//! encoder.write_psi(&mut out)?;
//! encoder.write_video_au(&mut out, 0, 0, true, &[0, 0, 0, 1, 0x65])?;
//! assert_eq!(out.len() % TS_PACKET_SIZE, 0);
//! # Ok(())
//! # }
//! ```

/// TS packet encoder turning access units into 188-byte packets
pub mod encoder;

/// PES packet construction and ADTS header synthesis
pub mod pes;

/// Core TS types, PIDs and PSI section builders
pub mod types;

// Re-export commonly used types and constants
pub use encoder::TsEncoder;
pub use pes::AdtsParams;
pub use types::{
    sample_rate_index, Pat, Pmt, TsHeader, PID_AUDIO, PID_PAT, PID_PMT, PID_VIDEO,
    STREAM_TYPE_AAC, STREAM_TYPE_H264, TS_PACKET_SIZE,
};
