use bytes::Bytes;

/// One coded frame handed to the muxer: a video access unit (Annex-B NAL
/// units) or one coded audio frame.
#[derive(Debug, Clone)]
pub struct AccessUnit {
    /// Payload bytes
    pub data: Bytes,
    /// Presentation timestamp, 90 kHz
    pub pts: i64,
    /// Decoding timestamp, 90 kHz; `None` means equal to `pts`
    pub dts: Option<i64>,
    /// Index into the stream descriptors registered at open time
    pub stream_index: usize,
    /// Key frame flag; for video this marks an IDR access unit
    pub is_key: bool,
}

impl AccessUnit {
    /// Creates an access unit around `data` with zeroed metadata.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: 0,
            dts: None,
            stream_index: 0,
            is_key: false,
        }
    }

    /// Sets the presentation timestamp (90 kHz).
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = pts;
        self
    }

    /// Sets an explicit decoding timestamp (90 kHz).
    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Sets the stream index.
    pub fn with_stream_index(mut self, index: usize) -> Self {
        self.stream_index = index;
        self
    }

    /// Sets the key (IDR) flag.
    pub fn with_key_flag(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    /// The effective decoding timestamp: `dts` when supplied, `pts` otherwise.
    pub fn effective_dts(&self) -> i64 {
        self.dts.unwrap_or(self.pts)
    }
}
