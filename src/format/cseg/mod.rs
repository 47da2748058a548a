//! # Cached Segment Engine
//!
//! The recording half of the crate: segments are assembled from access
//! units, held in a bounded in-memory ring, and consumed by a writer worker
//! thread.
//!
//! Data flows one direction:
//!
//! ```text
//! producer thread          cache ring           writer thread
//! write_packet ──► current segment ──► FIFO ──► writer back-end
//!                  (fragment chain)
//! ```
//!
//! Two threads share the [`SegmentCache`]: the producer (the caller of
//! [`CachedSegmentMuxer::write_packet`]) and the worker. They meet only in
//! short critical sections around the ring; neither sits in the other's
//! I/O path.

/// Bounded FIFO of closed segments with eviction and backpressure
pub mod cache;

/// Fixed-size byte pages backing segment bodies
pub mod fragment;

/// The muxer context: lifecycle, validation and segment assembly
pub mod muxer;

/// Closed segments and the builder for the currently open one
pub mod segment;

/// The writer worker thread consuming the cache
pub mod worker;

// Re-export the primary types
pub use cache::{EnqueueOutcome, SegmentCache};
pub use fragment::{FragmentChain, FRAGMENT_SIZE};
pub use muxer::{CachedSegmentMuxer, MuxerStats};
pub use segment::{Segment, SegmentBuilder};
pub use worker::{WriterState, WriterStats};
