use crate::av::TS_TIME_BASE;
use crate::error::{CsegError, Result};

use super::fragment::FragmentChain;

/// A closed, self-contained TS byte range with its timing metadata.
///
/// Segments are immutable once built: the producer assembles them through
/// [`SegmentBuilder`] and hands them to the cache, after which only writers
/// read them.
#[derive(Debug)]
pub struct Segment {
    /// Monotonically assigned sequence number
    pub sequence: i64,
    /// Start on the wall-clock timeline, seconds
    pub start_ts: f64,
    /// DTS of the opening IDR access unit, 90 kHz
    pub start_dts: i64,
    /// End-exclusive DTS bound, 90 kHz
    pub next_dts: i64,
    /// `(next_dts - start_dts) / 90000`, seconds
    pub duration: f64,
    /// Total payload bytes
    pub size: usize,
    chain: FragmentChain,
}

impl Segment {
    /// Iterates the segment body page by page.
    pub fn fragments(&self) -> impl Iterator<Item = &[u8]> {
        self.chain.iter()
    }

    /// Copies the body into one contiguous buffer (needed by upload-style
    /// writers).
    pub fn contiguous(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(self.size).map_err(|_| {
            CsegError::OutOfMemory(format!("segment body of {} bytes", self.size))
        })?;
        for page in self.chain.iter() {
            buf.extend_from_slice(page);
        }
        Ok(buf)
    }
}

/// The muxer's currently open segment: metadata plus the growing fragment
/// chain the TS encoder sinks into.
#[derive(Debug)]
pub struct SegmentBuilder {
    /// Sequence number this segment will carry
    pub sequence: i64,
    /// Start on the wall-clock timeline, seconds
    pub start_ts: f64,
    /// DTS of the opening access unit, 90 kHz
    pub start_dts: i64,
    chain: FragmentChain,
}

impl SegmentBuilder {
    /// Opens an empty segment starting at `start_dts`.
    pub fn new(sequence: i64, start_ts: f64, start_dts: i64) -> Self {
        Self {
            sequence,
            start_ts,
            start_dts,
            chain: FragmentChain::new(),
        }
    }

    /// The sink the TS encoder writes packets into.
    pub fn chain_mut(&mut self) -> &mut FragmentChain {
        &mut self.chain
    }

    /// Bytes accumulated so far.
    pub fn size(&self) -> usize {
        self.chain.size()
    }

    /// Whether any packet has been written yet.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Seconds elapsed from the segment start to `dts`.
    pub fn elapsed(&self, dts: i64) -> f64 {
        (dts - self.start_dts) as f64 / TS_TIME_BASE as f64
    }

    /// Closes the segment: freezes size and computes the duration from the
    /// end-exclusive `next_dts`.
    pub fn finish(self, next_dts: i64) -> Segment {
        let duration = (next_dts - self.start_dts) as f64 / TS_TIME_BASE as f64;
        Segment {
            sequence: self.sequence,
            start_ts: self.start_ts,
            start_dts: self.start_dts,
            next_dts,
            duration,
            size: self.chain.size(),
            chain: self.chain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_finish_computes_duration() {
        let mut builder = SegmentBuilder::new(7, 100.5, 90_000);
        builder.chain_mut().write_all(&[0x47; 188]).unwrap();
        assert!((builder.elapsed(135_000) - 0.5).abs() < 1e-9);

        let segment = builder.finish(270_000);
        assert_eq!(segment.sequence, 7);
        assert_eq!(segment.start_dts, 90_000);
        assert_eq!(segment.next_dts, 270_000);
        assert!((segment.duration - 2.0).abs() < 1e-9);
        assert_eq!(segment.size, 188);
    }

    #[test]
    fn test_contiguous_matches_fragments() {
        let mut builder = SegmentBuilder::new(0, 0.0, 0);
        for i in 0..50u8 {
            builder.chain_mut().write_all(&[i; 188]).unwrap();
        }
        let segment = builder.finish(90_000);
        let flat = segment.contiguous().unwrap();
        assert_eq!(flat.len(), segment.size);
        let rejoined: Vec<u8> = segment.fragments().flatten().copied().collect();
        assert_eq!(flat, rejoined);
    }
}
