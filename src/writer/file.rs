use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use log::{debug, info};

use crate::error::{CsegError, Result};
use crate::format::cseg::Segment;

use super::{SegmentWriter, WriteStatus, WriterContext};

/// Writer producing one `.ts` file per segment.
///
/// The URL path is used as a filename prefix: `file:///var/rec/cam1`
/// produces `/var/rec/cam1_0.ts`, `/var/rec/cam1_1.ts`, ... The parent
/// directory must exist.
pub struct FileWriter {
    prefix: PathBuf,
}

impl FileWriter {
    /// Creates an uninitialized file writer.
    pub fn new() -> Self {
        Self {
            prefix: PathBuf::new(),
        }
    }

    fn segment_path(&self, sequence: i64) -> PathBuf {
        let mut name = self
            .prefix
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "segment".to_string());
        name.push_str(&format!("_{}.ts", sequence));
        self.prefix.with_file_name(name)
    }
}

impl Default for FileWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentWriter for FileWriter {
    fn init(&mut self, ctx: &WriterContext) -> Result<()> {
        let path = ctx.url.path();
        if path.is_empty() || path == "/" {
            return Err(CsegError::InvalidConfig(format!(
                "file URL without a path: {}",
                ctx.filename
            )));
        }
        self.prefix = PathBuf::from(path);
        info!("file writer initialized, prefix {}", self.prefix.display());
        Ok(())
    }

    fn write_segment(&mut self, _ctx: &WriterContext, segment: &Segment) -> Result<WriteStatus> {
        let path = self.segment_path(segment.sequence);
        let mut file = File::create(&path)
            .map_err(|e| CsegError::WriterIo(format!("create {}: {}", path.display(), e)))?;
        for page in segment.fragments() {
            file.write_all(page)
                .map_err(|e| CsegError::WriterIo(format!("write {}: {}", path.display(), e)))?;
        }
        debug!(
            "segment {} written to {} ({} bytes)",
            segment.sequence,
            path.display(),
            segment.size
        );
        Ok(WriteStatus::Done)
    }

    fn uninit(&mut self, ctx: &WriterContext) {
        debug!("file writer released for {}", ctx.filename);
    }
}
