use super::{CodecType, StreamKind};

/// Descriptor of one elementary stream registered with the muxer.
///
/// Exactly one video stream is required and at most one audio stream is
/// accepted; validation happens at open time.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Stream kind (video or audio)
    pub kind: StreamKind,
    /// Codec carried by the stream
    pub codec: CodecType,
    /// Audio sample rate in Hz; must map to an ADTS sampling frequency index
    pub sample_rate: Option<u32>,
    /// Audio channel count (ADTS channel configuration, 1..=7)
    pub channels: Option<u8>,
}

impl StreamInfo {
    /// An H.264 video stream carrying Annex-B access units.
    pub fn video_h264() -> Self {
        Self {
            kind: StreamKind::Video,
            codec: CodecType::H264,
            sample_rate: None,
            channels: None,
        }
    }

    /// A raw AAC audio stream; the muxer prepends ADTS framing.
    pub fn audio_aac(sample_rate: u32, channels: u8) -> Self {
        Self {
            kind: StreamKind::Audio,
            codec: CodecType::Aac,
            sample_rate: Some(sample_rate),
            channels: Some(channels),
        }
    }

    /// An AAC audio stream whose frames already carry ADTS headers.
    pub fn audio_aac_with_adts(sample_rate: u32, channels: u8) -> Self {
        Self {
            kind: StreamKind::Audio,
            codec: CodecType::AacWithAdts,
            sample_rate: Some(sample_rate),
            channels: Some(channels),
        }
    }

    /// Whether the descriptor is internally consistent (kind matches codec).
    pub fn is_consistent(&self) -> bool {
        match self.kind {
            StreamKind::Video => self.codec.is_video(),
            StreamKind::Audio => self.codec.is_audio(),
        }
    }
}
