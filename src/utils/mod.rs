//! # Utility Functions and Types
//!
//! Common utilities shared by the TS packet encoder, currently the MPEG-2
//! CRC32 used to seal PSI tables.
//!
//! ## CRC Calculation
//!
//! ```rust
//! use cseg::utils::Crc32Mpeg2;
//!
//! let crc = Crc32Mpeg2::new();
//! let checksum = crc.calculate(&[0x01, 0x01]);
//! assert_eq!(checksum, 0xD66F_B816);
//! ```

/// CRC calculation implementations
pub mod crc;

// Re-export commonly used types
pub use crc::Crc32Mpeg2;
