use log::info;

use crate::error::Result;
use crate::format::cseg::Segment;

use super::{SegmentWriter, WriteStatus, WriterContext};

/// Writer that logs segment metadata and discards the bytes. Useful for
/// smoke tests and for measuring the packet path alone.
pub struct DummyWriter;

impl DummyWriter {
    /// Creates the dummy writer.
    pub fn new() -> Self {
        Self
    }
}

impl Default for DummyWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentWriter for DummyWriter {
    fn init(&mut self, ctx: &WriterContext) -> Result<()> {
        info!("dummy writer: URL {} is initialized", ctx.filename);
        Ok(())
    }

    fn write_segment(&mut self, _ctx: &WriterContext, segment: &Segment) -> Result<WriteStatus> {
        info!(
            "segment(size:{}, start_ts:{:.3}, duration:{:.3}, sequence:{}, start_dts:{}, next_dts:{}) is written",
            segment.size,
            segment.start_ts,
            segment.duration,
            segment.sequence,
            segment.start_dts,
            segment.next_dts
        );
        Ok(WriteStatus::Done)
    }

    fn uninit(&mut self, ctx: &WriterContext) {
        info!("dummy writer: URL {} is un-initialized", ctx.filename);
    }
}
