use crate::error::{CsegError, Result};
use bytes::{BufMut, BytesMut};

use super::types::{STREAM_ID_AAC, STREAM_ID_H264};

/// Largest ADTS frame: `frame_length` is a 13-bit field.
const ADTS_MAX_FRAME_LEN: usize = 1 << 13;

// PES timestamp markers, '001x' in the top nibble per IEC 13818-1 2.4.3.7
const TS_MARKER_PTS_ONLY: u8 = 0x20;
const TS_MARKER_PTS_OF_PAIR: u8 = 0x30;
const TS_MARKER_DTS_OF_PAIR: u8 = 0x10;

/// Writes a 5-byte PES timestamp in the `001x xxx1` layout.
fn put_timestamp(buf: &mut BytesMut, marker: u8, ts: u64) {
    let ts = ts & 0x1_FFFF_FFFF;
    buf.put_u8(marker | (((ts >> 29) & 0x0E) as u8) | 0x01);
    buf.put_u8((ts >> 22) as u8);
    buf.put_u8(((ts >> 14) as u8) | 0x01);
    buf.put_u8((ts >> 7) as u8);
    buf.put_u8(((ts << 1) as u8) | 0x01);
}

/// Builds a complete video PES packet: 19-byte header carrying PTS and DTS,
/// an access-unit delimiter NAL, then the Annex-B payload.
///
/// `packet_length` is left zero, which IEC 13818-1 permits for video
/// elementary streams.
pub fn video_pes(pts: u64, dts: u64, is_idr: bool, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(19 + 6 + payload.len());
    buf.put_slice(&[0x00, 0x00, 0x01, STREAM_ID_H264]);
    buf.put_u16(0x0000); // PES packet length, unbounded for video
    buf.put_u8(0x80); // marker bits
    buf.put_u8(0xC0); // PTS and DTS present
    buf.put_u8(0x0A); // PES header data length
    put_timestamp(&mut buf, TS_MARKER_PTS_OF_PAIR, pts);
    put_timestamp(&mut buf, TS_MARKER_DTS_OF_PAIR, dts);
    // AU delimiter, one per access unit
    buf.put_slice(&[0x00, 0x00, 0x00, 0x01, 0x09]);
    buf.put_u8(if is_idr { 0x10 } else { 0x30 });
    buf.put_slice(payload);
    buf
}

/// ADTS fixed-header parameters of the audio stream, resolved once at open
/// time from the stream descriptor.
#[derive(Debug, Clone, Copy)]
pub struct AdtsParams {
    /// 4-bit sampling frequency index
    pub sample_rate_index: u8,
    /// 3-bit channel configuration
    pub channel_config: u8,
}

impl AdtsParams {
    /// Synthesizes the 7-byte ADTS header for a raw AAC frame of
    /// `payload_len` bytes. MPEG-4, AAC-LC, no CRC protection.
    pub fn header(&self, payload_len: usize) -> Result<[u8; 7]> {
        let frame_len = 7 + payload_len;
        if frame_len >= ADTS_MAX_FRAME_LEN {
            return Err(CsegError::InvalidInput(format!(
                "ADTS frame too large: {} bytes",
                frame_len
            )));
        }
        let mut hdr = [0u8; 7];
        hdr[0] = 0xFF;
        hdr[1] = 0xF1; // MPEG-4, layer 0, protection absent
        hdr[2] = (1 << 6) // profile: AAC-LC (audio object type 2)
            | ((self.sample_rate_index & 0x0F) << 2)
            | ((self.channel_config >> 2) & 0x01);
        hdr[3] = ((self.channel_config & 0x03) << 6) | (((frame_len >> 11) & 0x03) as u8);
        hdr[4] = (frame_len >> 3) as u8;
        hdr[5] = (((frame_len & 0x07) << 5) as u8) | 0x1F;
        hdr[6] = 0xFC;
        Ok(hdr)
    }
}

/// Builds a complete audio PES packet: 14-byte header carrying PTS, an
/// optional synthesized ADTS header, then the frame payload.
///
/// `adts` is `None` when the stream codec already frames its payload with
/// ADTS. The PES `packet_length` field is filled in, so the whole packet
/// must fit in the 16-bit field.
pub fn audio_pes(pts: u64, adts: Option<&AdtsParams>, payload: &[u8]) -> Result<BytesMut> {
    let adts_header = match adts {
        Some(params) => Some(params.header(payload.len())?),
        None => None,
    };
    let header_len = 14 + if adts_header.is_some() { 7 } else { 0 };
    let pes_length = header_len + payload.len() - 6;
    if pes_length >= 1 << 16 {
        return Err(CsegError::InvalidInput(format!(
            "audio PES too large: {} bytes",
            pes_length
        )));
    }
    let mut buf = BytesMut::with_capacity(header_len + payload.len());
    buf.put_slice(&[0x00, 0x00, 0x01, STREAM_ID_AAC]);
    buf.put_u16(pes_length as u16);
    buf.put_u8(0x84); // marker bits, data alignment
    buf.put_u8(0x80); // PTS present
    buf.put_u8(0x05); // PES header data length
    put_timestamp(&mut buf, TS_MARKER_PTS_ONLY, pts);
    if let Some(hdr) = adts_header {
        buf.put_slice(&hdr);
    }
    buf.put_slice(payload);
    Ok(buf)
}
