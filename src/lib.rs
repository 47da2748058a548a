#![doc(html_root_url = "https://docs.rs/cseg/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # cseg - Cached Segment Muxer
//!
//! `cseg` is the recording backbone of a DVR/IVR system: it accepts a live
//! stream of compressed H.264/AAC access units, muxes them into MPEG-TS
//! segments bounded in duration and size, keeps a bounded ring of recent
//! segments in memory, and delivers each closed segment to a pluggable
//! writer back-end on a dedicated thread.
//!
//! ## Features
//!
//! ### Muxing
//! - IEC 13818-1 transport stream output: PAT/PMT, PES framing, PCR,
//!   adaptation-field stuffing, per-PID continuity counters
//! - Segments cut on IDR frames, subject to a target duration and a hard
//!   size cap
//! - ADTS synthesis for raw AAC input
//!
//! ### Caching and delivery
//! - Bounded in-memory FIFO of closed segments with configurable
//!   backpressure: block the producer or evict the oldest segment
//! - Pre-roll retention while the writer is paused
//! - Writer back-ends selected by URL scheme: `file://`, `dummy://`,
//!   `ivr://` (three-phase REST upload), or custom registrations
//!
//! ## Quick Start
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! cseg = "0.1.0"
//! ```
//!
//! ### Recording to segment files
//!
//! ```rust,no_run
//! use cseg::av::{AccessUnit, StreamInfo};
//! use cseg::config::MuxerConfig;
//! use cseg::format::cseg::CachedSegmentMuxer;
//! use cseg::writer::WriterRegistry;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = WriterRegistry::with_builtin_writers();
//!     let config = MuxerConfig::new("file:///var/rec/cam1")
//!         .with_segment_time(10.0)
//!         .with_max_nb_segments(3);
//!     let streams = vec![
//!         StreamInfo::video_h264(),
//!         StreamInfo::audio_aac(48_000, 2),
//!     ];
//!     let mut muxer = CachedSegmentMuxer::open(config, streams, &registry)?;
//!
//!     // feed access units from the capture pipeline
//!     let frame = AccessUnit::new(vec![0, 0, 0, 1, 0x65, 0x88])
//!         .with_stream_index(0)
//!         .with_pts(0)
//!         .with_key_flag(true);
//!     muxer.write_packet(&frame)?;
//!
//!     muxer.close()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: input model, access units and stream descriptors
//! - `config`: the muxer option table and its textual parser
//! - `format::ts`: the MPEG-TS wire format (PSI, PES, packetization)
//! - `format::cseg`: segment assembly, the cache ring and the writer worker
//! - `writer`: the writer contract, registry and built-in back-ends
//! - `error`: error types and the crate-wide `Result`
//! - `utils`: MPEG-2 CRC32
//!
//! ## Threading Model
//!
//! Two OS threads share a muxer: the producer calling
//! [`write_packet`](format::cseg::CachedSegmentMuxer::write_packet), and the
//! writer worker consuming the cache. They share only the cache mutex for
//! short critical sections; writer I/O never blocks the packet path, and the
//! producer only suspends inside a full-cache enqueue in blocking mode.

/// Audio/Video input types: access units and stream descriptors
pub mod av;

/// Muxer configuration and option parsing
pub mod config;

/// Error types and utilities
pub mod error;

/// Format implementations: TS encoding and the cached segment engine
pub mod format;

/// Common utilities and helper functions
pub mod utils;

/// Segment writer back-ends and their registry
pub mod writer;

pub use config::MuxerConfig;
pub use error::{CsegError, Result};
pub use format::cseg::{CachedSegmentMuxer, MuxerStats};
pub use writer::WriterRegistry;
