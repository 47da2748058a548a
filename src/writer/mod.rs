//! # Segment Writer Back-Ends
//!
//! A writer is the sink strategy a muxer delivers closed segments to. The
//! back-end is selected by the scheme of the configured `filename` URL and
//! runs entirely on the writer worker thread.
//!
//! Built-in writers:
//!
//! - `file://` writes one `.ts` file per segment under a path prefix
//! - `dummy://` logs segment metadata and discards the bytes
//! - `ivr://` performs a three-phase REST upload to an IVR storage service
//!
//! ## Example Usage
//!
//! ```rust
//! use cseg::writer::WriterRegistry;
//!
//! let registry = WriterRegistry::with_builtin_writers();
//! assert!(registry.create_for_scheme("dummy").is_some());
//! assert!(registry.create_for_scheme("ftp").is_none());
//! ```

use std::time::Duration;

use url::Url;

use crate::error::Result;
use crate::format::cseg::Segment;

/// Dummy writer that logs and discards segments
pub mod dummy;
/// Filesystem writer producing one file per segment
pub mod file;
/// REST writer uploading segments to an IVR storage service
pub mod ivr;

pub use dummy::DummyWriter;
pub use file::FileWriter;
pub use ivr::IvrWriter;

/// Outcome of a successful `write_segment` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// The segment was delivered; the worker frees it.
    Done,
    /// The back-end cannot accept the segment right now; the worker keeps
    /// it cached and retries later.
    Pause,
}

/// Configuration handed to every writer call.
#[derive(Debug, Clone)]
pub struct WriterContext {
    /// The configured destination, verbatim
    pub filename: String,
    /// Parsed form of `filename`
    pub url: Url,
    /// Wall-clock budget for one I/O operation
    pub timeout: Duration,
}

/// A pluggable segment sink.
///
/// All three operations run on the writer worker thread; implementations
/// only need to be consistent with themselves. Errors from `write_segment`
/// lose that one segment and are counted; they never abort the muxer.
pub trait SegmentWriter: Send {
    /// Called once when the muxer opens. A failure here fails the open.
    fn init(&mut self, _ctx: &WriterContext) -> Result<()> {
        Ok(())
    }

    /// Delivers one closed segment.
    fn write_segment(&mut self, ctx: &WriterContext, segment: &Segment) -> Result<WriteStatus>;

    /// Called once when the muxer closes; releases everything `init`
    /// acquired.
    fn uninit(&mut self, _ctx: &WriterContext) {}
}

type WriterFactory = Box<dyn Fn() -> Box<dyn SegmentWriter> + Send + Sync>;

struct RegistryEntry {
    name: &'static str,
    protos: &'static [&'static str],
    make: WriterFactory,
}

/// Table of writer back-ends keyed by URL scheme.
///
/// Built once at startup and passed into
/// [`CachedSegmentMuxer::open`](crate::format::cseg::CachedSegmentMuxer::open);
/// there is no process-wide registry.
pub struct WriterRegistry {
    entries: Vec<RegistryEntry>,
}

impl WriterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Creates a registry holding the built-in writers.
    pub fn with_builtin_writers() -> Self {
        let mut registry = Self::new();
        registry.register("file_writer", &["file"], || Box::new(FileWriter::new()));
        registry.register("dummy_writer", &["dummy"], || Box::new(DummyWriter::new()));
        registry.register("ivr_writer", &["ivr"], || Box::new(IvrWriter::new()));
        registry
    }

    /// Registers a writer under `name` for the given URL schemes. A scheme
    /// registered twice resolves to the earlier entry.
    pub fn register<F>(&mut self, name: &'static str, protos: &'static [&'static str], make: F)
    where
        F: Fn() -> Box<dyn SegmentWriter> + Send + Sync + 'static,
    {
        self.entries.push(RegistryEntry {
            name,
            protos,
            make: Box::new(make),
        });
    }

    /// Instantiates the writer registered for `scheme`, returning its
    /// registered name alongside.
    pub fn create_for_scheme(&self, scheme: &str) -> Option<(&'static str, Box<dyn SegmentWriter>)> {
        self.entries
            .iter()
            .find(|entry| entry.protos.contains(&scheme))
            .map(|entry| (entry.name, (entry.make)()))
    }
}

impl Default for WriterRegistry {
    fn default() -> Self {
        Self::with_builtin_writers()
    }
}
