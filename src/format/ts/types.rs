use crate::error::{CsegError, Result};
use crate::utils::Crc32Mpeg2;
use bytes::{BufMut, BytesMut};

// Stream IDs
/// Stream ID for H.264 video streams in PES packets
pub const STREAM_ID_H264: u8 = 0xE0;
/// Stream ID for AAC audio streams in PES packets
pub const STREAM_ID_AAC: u8 = 0xC0;

// PIDs
/// PID for the Program Association Table (PAT)
pub const PID_PAT: u16 = 0x0000;
/// PID for the Program Map Table (PMT)
pub const PID_PMT: u16 = 0x0FF0;
/// PID for the video elementary stream
pub const PID_VIDEO: u16 = 0x1000;
/// PID for the audio elementary stream
pub const PID_AUDIO: u16 = 0x1001;

// Table IDs
/// Table ID for the Program Association Table (PAT)
pub const TABLE_ID_PAT: u8 = 0x00;
/// Table ID for the Program Map Table (PMT)
pub const TABLE_ID_PMT: u8 = 0x02;

// Elementary stream types (1 byte, used in the PMT stream loop)
/// Stream type for H.264 video
pub const STREAM_TYPE_H264: u8 = 0x1B;
/// Stream type for ADTS AAC audio
pub const STREAM_TYPE_AAC: u8 = 0x0F;

// Constants
/// Size of a Transport Stream packet in bytes
pub const TS_PACKET_SIZE: usize = 188;
/// Size of a Transport Stream header in bytes
pub const TS_HEADER_SIZE: usize = 4;

/// ADTS sampling frequencies, indexed by the 4-bit
/// `sampling_frequency_index` field of the fixed header.
pub const AAC_SAMPLE_FREQUENCIES: [u32; 13] = [
    96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025, 8_000,
    7_350,
];

/// Maps an audio sample rate to its ADTS sampling frequency index.
pub fn sample_rate_index(rate: u32) -> Option<u8> {
    AAC_SAMPLE_FREQUENCIES
        .iter()
        .position(|&f| f == rate)
        .map(|i| i as u8)
}

/// The fixed 4-byte prefix of every TS packet.
///
/// Only the fields this muxer actually drives are modeled; transport error,
/// priority and scrambling are always zero on the encode path.
#[derive(Debug, Clone)]
pub struct TsHeader {
    /// Set on the first packet of a PES packet or PSI section
    pub payload_unit_start: bool,
    /// Packet identifier (13 bits)
    pub pid: u16,
    /// Whether an adaptation field follows the header
    pub adaptation_field: bool,
    /// Per-PID counter, mod 16, incremented on payload-carrying packets
    pub continuity_counter: u8,
}

impl TsHeader {
    /// Writes the 4 header bytes. The adaptation field control is `11`
    /// (field + payload) when an adaptation field is present, `01` otherwise;
    /// every packet this muxer emits carries payload.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(0x47);
        let mut b1 = ((self.pid >> 8) & 0x1F) as u8;
        if self.payload_unit_start {
            b1 |= 0x40;
        }
        buf.put_u8(b1);
        buf.put_u8((self.pid & 0xFF) as u8);
        let control = if self.adaptation_field { 0x30 } else { 0x10 };
        buf.put_u8(control | (self.continuity_counter & 0x0F));
    }
}

/// Writes a 6-byte PCR field: 33-bit base, 6 reserved bits set, 9-bit
/// extension fixed at zero. The base is the access unit's DTS on the
/// 90 kHz clock.
pub fn put_pcr(buf: &mut BytesMut, base: u64) {
    let base = base & 0x1_FFFF_FFFF;
    buf.put_u8((base >> 25) as u8);
    buf.put_u8((base >> 17) as u8);
    buf.put_u8((base >> 9) as u8);
    buf.put_u8((base >> 1) as u8);
    buf.put_u8((((base & 1) << 7) as u8) | 0x7E);
    buf.put_u8(0x00);
}

/// Program Association Table for the single program this muxer emits.
#[derive(Debug, Clone)]
pub struct Pat {
    /// PID the Program Map Table is carried on
    pub pmt_pid: u16,
}

impl Pat {
    /// Encodes the complete PAT section, CRC included.
    ///
    /// One program (number 1), transport_stream_id 0, version 0,
    /// current_next_indicator 1; section length is always 13.
    pub fn section(&self, crc: &Crc32Mpeg2) -> BytesMut {
        let mut buf = BytesMut::with_capacity(16);
        buf.put_u8(TABLE_ID_PAT);
        buf.put_u8(0xB0); // section syntax 1, reserved bits 1
        buf.put_u8(0x0D); // section length 13
        buf.put_u16(0x0000); // transport_stream_id
        buf.put_u8(0xC1); // reserved, version 0, current_next 1
        buf.put_u8(0x00); // section number
        buf.put_u8(0x00); // last section number
        buf.put_u16(0x0001); // program number
        buf.put_u16(self.pmt_pid & 0x1FFF | 0xE000);
        let checksum = crc.calculate(&buf);
        buf.put_u32(checksum);
        buf
    }
}

/// Program Map Table: PCR PID plus the elementary stream loop.
#[derive(Debug, Clone)]
pub struct Pmt {
    /// PID carrying the PCR (the video PID)
    pub pcr_pid: u16,
    /// `(stream_type, elementary_pid)` pairs; empty descriptor loops
    pub streams: Vec<(u8, u16)>,
}

impl Pmt {
    /// Encodes the complete PMT section, CRC included.
    ///
    /// Section length is 18 with one stream, 23 with two; descriptor loops
    /// are empty.
    pub fn section(&self, crc: &Crc32Mpeg2) -> Result<BytesMut> {
        if self.streams.is_empty() {
            return Err(CsegError::Internal("PMT without streams".to_string()));
        }
        let section_length = 13 + 5 * self.streams.len();
        let mut buf = BytesMut::with_capacity(3 + section_length);
        buf.put_u8(TABLE_ID_PMT);
        buf.put_u8(0xB0);
        buf.put_u8(section_length as u8);
        buf.put_u16(0x0001); // program number
        buf.put_u8(0xC1); // reserved, version 0, current_next 1
        buf.put_u8(0x00); // section number
        buf.put_u8(0x00); // last section number
        buf.put_u16(self.pcr_pid & 0x1FFF | 0xE000);
        buf.put_u16(0xF000); // program_info_length 0
        for &(stream_type, pid) in &self.streams {
            buf.put_u8(stream_type);
            buf.put_u16(pid & 0x1FFF | 0xE000);
            buf.put_u16(0xF000); // ES_info_length 0
        }
        let checksum = crc.calculate(&buf);
        buf.put_u32(checksum);
        Ok(buf)
    }
}
