//! # Error Types
//!
//! This module provides the error types used throughout the cseg library.
//! It defines a central error type `CsegError` that encapsulates all possible
//! errors that can occur while muxing, caching and delivering segments.
//!
//! ## Example Usage
//!
//! ```rust
//! use cseg::error::{Result, CsegError};
//!
//! fn validate_payload(data: &[u8]) -> Result<()> {
//!     if data.is_empty() {
//!         return Err(CsegError::InvalidInput("empty access unit".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Primary error type for the cseg library
#[derive(Error, Debug)]
pub enum CsegError {
    /// I/O errors that occur during file or network operations
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors in the muxer configuration (bad option value, unknown URL scheme)
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Errors for invalid or malformed input data
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The stream has not started yet (no IDR frame seen); benign, the
    /// offending access unit is dropped
    #[error("stream not started")]
    NotStarted,

    /// A single access unit cannot fit into a segment under the configured
    /// size cap
    #[error("segment overflow: {0}")]
    SegmentOverflow(String),

    /// The muxer is shutting down; no further packets are accepted
    #[error("muxer is shutting down")]
    ShuttingDown,

    /// The writer back-end asked to be called again later
    #[error("writer paused")]
    WriterPause,

    /// Network or filesystem failure in a writer back-end
    #[error("writer io error: {0}")]
    WriterIo(String),

    /// The writer back-end received a response it cannot interpret
    #[error("writer protocol error: {0}")]
    WriterProtocol(String),

    /// A remote writer endpoint rejected the request (4xx class)
    #[error("writer remote client error: status {0}")]
    WriterRemote4xx(u16),

    /// A remote writer endpoint failed (5xx class)
    #[error("writer remote server error: status {0}")]
    WriterRemote5xx(u16),

    /// An allocation could not be satisfied
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// Invariant violation inside the muxer itself
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for cseg operations.
///
/// This type is used throughout the cseg library to handle operations
/// that can produce a `CsegError`.
pub type Result<T> = std::result::Result<T, CsegError>;

impl CsegError {
    /// Whether the error is transient from the producer's point of view:
    /// the packet was dropped but the muxer remains usable.
    pub fn is_benign(&self) -> bool {
        matches!(self, CsegError::NotStarted)
    }
}
