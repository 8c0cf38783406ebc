//! Interleaved audio/video mux packets carried in the `mdat` of
//! bootstrap-indexed fragments.
//!
//! Each packet is an 11-byte header (tag type, 24-bit payload size, 24-bit
//! timestamp plus an extension byte, 24-bit stream id), the payload, and a
//! 4-byte trailer holding the previous packet size.

use vodcheck_common::TrackKind;

use crate::bitstream::ByteReader;
use crate::{Error, Result};

pub const TAG_AUDIO: u8 = 8;
pub const TAG_VIDEO: u8 = 9;

const HEADER_SIZE: usize = 11;
const TRAILER_SIZE: usize = 4;

/// One decoded mux packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxPacket {
    /// Offset of the header within the parsed buffer's coordinate space.
    pub offset: usize,
    pub tag_type: u8,
    pub data_size: u32,
    /// Decode timestamp in milliseconds.
    pub timestamp: i64,
    /// Signed presentation offset for video frames, zero otherwise.
    pub composition_offset: i32,
    /// Codec configuration rather than a coded frame.
    pub is_sequence_header: bool,
}

impl MuxPacket {
    pub fn track(&self) -> Option<TrackKind> {
        match self.tag_type {
            TAG_VIDEO => Some(TrackKind::Video),
            TAG_AUDIO => Some(TrackKind::Audio),
            _ => None,
        }
    }

    /// Whether this packet contributes to timing.
    pub fn is_frame(&self) -> bool {
        self.track().is_some() && !self.is_sequence_header
    }

    pub fn dts(&self) -> i64 {
        self.timestamp
    }

    pub fn pts(&self) -> i64 {
        self.timestamp + self.composition_offset as i64
    }
}

/// Parse every packet in `data`. `base` is the absolute offset of `data[0]`.
pub fn parse_mux_packets(data: &[u8], base: usize) -> Result<Vec<MuxPacket>> {
    let mut r = ByteReader::with_base(data, base);
    let mut packets = Vec::new();

    while !r.is_empty() {
        let offset = base + r.position();
        if r.remaining() < HEADER_SIZE {
            return Err(Error::truncated(
                "mux packet header",
                offset,
                HEADER_SIZE,
                r.remaining(),
            ));
        }
        let tag_type = r.read_u8()?;
        let data_size = r.read_u24()?;
        let low = r.read_u24()? as i64;
        let ext = r.read_u8()? as i64;
        let _stream_id = r.read_u24()?;
        let timestamp = (ext << 24) | low;

        let payload = r.slice(data_size as usize)?;
        r.skip(TRAILER_SIZE)?;

        let mut packet = MuxPacket {
            offset,
            tag_type,
            data_size,
            timestamp,
            composition_offset: 0,
            is_sequence_header: false,
        };

        match tag_type {
            TAG_VIDEO | TAG_AUDIO => {
                let mut p = ByteReader::with_base(payload, offset + HEADER_SIZE);
                let _codec = p.read_u8()?;
                let packet_type = p.read_u8()?;
                packet.is_sequence_header = packet_type != 1;
                if tag_type == TAG_VIDEO {
                    packet.composition_offset = p.read_i24()?;
                }
            }
            _ => {}
        }
        packets.push(packet);
    }

    Ok(packets)
}
