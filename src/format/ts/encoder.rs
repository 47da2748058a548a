use std::io::Write;

use bytes::{BufMut, BytesMut};

use crate::av::{CodecType, StreamInfo, StreamKind};
use crate::error::{CsegError, Result};
use crate::utils::Crc32Mpeg2;

use super::pes::{audio_pes, video_pes, AdtsParams};
use super::types::*;

/// Adaptation-field overhead on the first packet of a video access unit:
/// length byte, flags byte and a 6-byte PCR.
const PCR_FIELD_LEN: usize = 8;

/// Encodes access units into 188-byte transport packets.
///
/// One encoder instance serves the whole muxer lifetime: continuity counters
/// run across segment boundaries so concatenated segments still form a
/// continuous stream. The PSI burst (PAT followed by PMT) is written at the
/// start of every segment.
pub struct TsEncoder {
    pat: Pat,
    pmt: Pmt,
    adts: Option<AdtsParams>,
    crc: Crc32Mpeg2,
    video_cc: u8,
    audio_cc: u8,
    pat_cc: u8,
    pmt_cc: u8,
}

impl TsEncoder {
    /// Builds an encoder for the validated stream set. The descriptor list
    /// must contain exactly one video stream; an audio stream, when present,
    /// fixes the ADTS parameters (skipped for [`CodecType::AacWithAdts`]).
    pub fn new(streams: &[StreamInfo]) -> Result<Self> {
        let mut pmt_streams = vec![(STREAM_TYPE_H264, PID_VIDEO)];
        let mut adts = None;
        if let Some(audio) = streams.iter().find(|s| s.kind == StreamKind::Audio) {
            pmt_streams.push((STREAM_TYPE_AAC, PID_AUDIO));
            if audio.codec == CodecType::Aac {
                let rate = audio.sample_rate.ok_or_else(|| {
                    CsegError::InvalidConfig("audio stream without sample rate".to_string())
                })?;
                let index = sample_rate_index(rate).ok_or_else(|| {
                    CsegError::InvalidConfig(format!("invalid audio sample frequency {}", rate))
                })?;
                adts = Some(AdtsParams {
                    sample_rate_index: index,
                    channel_config: audio.channels.unwrap_or(2) & 0x07,
                });
            }
        }
        Ok(Self {
            pat: Pat { pmt_pid: PID_PMT },
            pmt: Pmt {
                pcr_pid: PID_VIDEO,
                streams: pmt_streams,
            },
            adts,
            crc: Crc32Mpeg2::new(),
            video_cc: 0,
            audio_cc: 0,
            pat_cc: 0,
            pmt_cc: 0,
        })
    }

    /// Emits the PSI burst: one PAT packet followed by one PMT packet.
    pub fn write_psi<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        let pat = self.pat.section(&self.crc);
        write_section_packet(sink, PID_PAT, &mut self.pat_cc, &pat)?;
        let pmt = self.pmt.section(&self.crc)?;
        write_section_packet(sink, PID_PMT, &mut self.pmt_cc, &pmt)?;
        Ok(())
    }

    /// Packetizes one video access unit. The first packet carries a PCR
    /// (base = DTS) and, for IDR units, the random access indicator.
    pub fn write_video_au<W: Write>(
        &mut self,
        sink: &mut W,
        pts: i64,
        dts: i64,
        is_idr: bool,
        payload: &[u8],
    ) -> Result<()> {
        let pes = video_pes(pts as u64, dts as u64, is_idr, payload);
        write_pes_packets(
            sink,
            PID_VIDEO,
            &mut self.video_cc,
            &pes,
            Some(dts as u64),
            is_idr,
        )
    }

    /// Packetizes one audio access unit, prepending the ADTS header for raw
    /// AAC streams.
    pub fn write_audio_au<W: Write>(&mut self, sink: &mut W, pts: i64, payload: &[u8]) -> Result<()> {
        let pes = audio_pes(pts as u64, self.adts.as_ref(), payload)?;
        write_pes_packets(sink, PID_AUDIO, &mut self.audio_cc, &pes, None, false)
    }

    /// Upper bound on the TS bytes one access unit will occupy, used for the
    /// segment size cap. Conservative by at most one packet.
    pub fn estimate_au_size(&self, payload_len: usize, is_video: bool) -> usize {
        let (pes_header, af_first) = if is_video {
            (19 + 6, PCR_FIELD_LEN)
        } else {
            (14 + 7, 0)
        };
        let pes_len = pes_header + payload_len;
        let mut packets = (pes_len + af_first).div_ceil(TS_PACKET_SIZE - TS_HEADER_SIZE);
        let slack = packets * (TS_PACKET_SIZE - TS_HEADER_SIZE) - af_first - pes_len;
        if slack == 1 || slack == 2 {
            // the tail rolls into one more packet
            packets += 1;
        }
        packets * TS_PACKET_SIZE
    }
}

/// Writes a PSI section as a single TS packet: pointer field, section bytes,
/// then raw 0xFF padding out to 188 bytes.
fn write_section_packet<W: Write>(
    sink: &mut W,
    pid: u16,
    cc: &mut u8,
    section: &[u8],
) -> Result<()> {
    let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);
    TsHeader {
        payload_unit_start: true,
        pid,
        adaptation_field: false,
        continuity_counter: *cc,
    }
    .write_to(&mut buf);
    *cc = (*cc + 1) & 0x0F;
    buf.put_u8(0x00); // pointer field
    buf.put_slice(section);
    if buf.len() > TS_PACKET_SIZE {
        return Err(CsegError::Internal(format!(
            "PSI section of {} bytes does not fit one packet",
            section.len()
        )));
    }
    buf.resize(TS_PACKET_SIZE, 0xFF);
    sink.write_all(&buf)?;
    Ok(())
}

/// Splits a complete PES packet into TS packets on `pid`.
///
/// The first packet sets the payload unit start indicator and, when `pcr` is
/// given, opens an adaptation field carrying it (`random_access` also lands
/// there). The last packet absorbs slack into adaptation-field stuffing;
/// when 1 or 2 bytes of slack remain on a packet with no field yet, a
/// minimal 3-byte field is inserted and the leftover payload rolls into one
/// more packet.
fn write_pes_packets<W: Write>(
    sink: &mut W,
    pid: u16,
    cc: &mut u8,
    pes: &[u8],
    pcr: Option<u64>,
    random_access: bool,
) -> Result<()> {
    let mut offset = 0usize;
    let mut first = true;
    while offset < pes.len() {
        let remaining = pes.len() - offset;

        // Adaptation field body (everything after the length byte)
        let mut af_body: Option<BytesMut> = None;
        if first && pcr.is_some() {
            let mut body = BytesMut::with_capacity(PCR_FIELD_LEN - 1);
            let mut flags = 0x10u8; // PCR flag
            if random_access {
                flags |= 0x40;
            }
            body.put_u8(flags);
            put_pcr(&mut body, pcr.unwrap_or(0));
            af_body = Some(body);
        }

        let af_total = af_body.as_ref().map(|b| 1 + b.len()).unwrap_or(0);
        let mut available = TS_PACKET_SIZE - TS_HEADER_SIZE - af_total;
        if remaining < available {
            let slack = available - remaining;
            match af_body.as_mut() {
                Some(body) => {
                    // grow the existing field's stuffing to an exact fit
                    body.resize(body.len() + slack, 0xFF);
                    available = remaining;
                }
                None if slack >= 3 => {
                    let mut body = BytesMut::with_capacity(slack - 1);
                    body.put_u8(0x00); // flags
                    body.resize(slack - 1, 0xFF);
                    af_body = Some(body);
                    available = remaining;
                }
                None => {
                    // too little room for an exact fit: minimal field with one
                    // stuffing byte, the tail rolls into the next packet
                    let mut body = BytesMut::with_capacity(2);
                    body.put_u8(0x00);
                    body.put_u8(0xFF);
                    af_body = Some(body);
                    available = TS_PACKET_SIZE - TS_HEADER_SIZE - 3;
                }
            }
        }

        let take = remaining.min(available);
        let mut buf = BytesMut::with_capacity(TS_PACKET_SIZE);
        TsHeader {
            payload_unit_start: first,
            pid,
            adaptation_field: af_body.is_some(),
            continuity_counter: *cc,
        }
        .write_to(&mut buf);
        *cc = (*cc + 1) & 0x0F;
        if let Some(body) = af_body {
            buf.put_u8(body.len() as u8);
            buf.put_slice(&body);
        }
        buf.put_slice(&pes[offset..offset + take]);
        debug_assert_eq!(buf.len(), TS_PACKET_SIZE);
        sink.write_all(&buf)?;

        offset += take;
        first = false;
    }
    Ok(())
}
