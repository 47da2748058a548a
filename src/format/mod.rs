//! # Media Format Implementations
//!
//! This module holds the two halves of the muxer:
//!
//! - **ts**: the MPEG Transport Stream wire format: PSI tables, PES
//!   framing and 188-byte packetization
//! - **cseg**: the cached segment engine: segment assembly, the bounded
//!   in-memory ring and the writer worker
//!
//! ## Example Usage
//!
//! ```rust
//! use cseg::av::{AccessUnit, StreamInfo};
//! use cseg::config::MuxerConfig;
//! use cseg::format::cseg::CachedSegmentMuxer;
//! use cseg::writer::WriterRegistry;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = WriterRegistry::with_builtin_writers();
//! let config = MuxerConfig::new("dummy://demo");
//! let mut muxer = CachedSegmentMuxer::open(
//!     config,
//!     vec![StreamInfo::video_h264()],
//!     &registry,
//! )?;
//! muxer.write_packet(
//!     &AccessUnit::new(vec![0, 0, 0, 1, 0x65]).with_key_flag(true),
//! )?;
//! muxer.close()?;
//! # Ok(())
//! # }
//! ```

/// Cached segment engine: assembly, ring cache, writer worker
pub mod cseg;

/// MPEG Transport Stream encoding
pub mod ts;

// Re-export commonly used types
pub use self::cseg::{CachedSegmentMuxer, MuxerStats, Segment};
pub use self::ts::TsEncoder;
