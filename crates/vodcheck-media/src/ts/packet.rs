//! Transport packet header and adaptation field.

use crate::bitstream::BitReader;
use crate::{Error, Result};

pub const PACKET_SIZE: usize = 188;
pub const SYNC_BYTE: u8 = 0x47;
pub const PAT_PID: u16 = 0x0000;
pub const NULL_PID: u16 = 0x1FFF;

/// Decoded 4-byte packet header plus the adaptation-field bits we use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub pid: u16,
    pub payload_unit_start: bool,
    pub has_adaptation: bool,
    pub has_payload: bool,
    pub continuity_counter: u8,
    pub discontinuity: bool,
    /// Offset of the first payload byte within the packet.
    pub payload_offset: usize,
}

impl PacketHeader {
    /// Parse a 188-byte packet located at `offset` in the segment.
    pub fn parse(packet: &[u8], offset: usize) -> Result<Self> {
        if packet.len() < PACKET_SIZE {
            return Err(Error::truncated("ts packet", offset, PACKET_SIZE, packet.len()));
        }
        if packet[0] != SYNC_BYTE {
            return Err(Error::invalid_header(
                "sync byte",
                offset,
                format!("{:#04x}", SYNC_BYTE),
                format!("{:#04x}", packet[0]),
            ));
        }

        let mut bits = BitReader::new(&packet[1..4]);
        let _transport_error = bits.read_flag()?;
        let payload_unit_start = bits.read_flag()?;
        let _priority = bits.read_flag()?;
        let pid = bits.read_bits(13)? as u16;
        let _scrambling = bits.read_bits(2)?;
        let has_adaptation = bits.read_flag()?;
        let has_payload = bits.read_flag()?;
        let continuity_counter = bits.read_bits(4)? as u8;

        let mut payload_offset = 4;
        let mut discontinuity = false;
        if has_adaptation {
            let length = packet[4] as usize;
            if length > 0 {
                discontinuity = packet[5] & 0x80 != 0;
            }
            payload_offset = 5 + length;
            if payload_offset > PACKET_SIZE {
                return Err(Error::invalid_header(
                    "adaptation field length",
                    offset + 4,
                    "<= 183",
                    length,
                ));
            }
        }

        Ok(Self {
            pid,
            payload_unit_start,
            has_adaptation,
            has_payload,
            continuity_counter,
            discontinuity,
            payload_offset,
        })
    }

    /// Payload bytes of `packet` (empty when the packet carries none).
    pub fn payload<'p>(&self, packet: &'p [u8]) -> &'p [u8] {
        if self.has_payload {
            &packet[self.payload_offset..PACKET_SIZE]
        } else {
            &[]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(header: [u8; 4]) -> Vec<u8> {
        let mut p = vec![0xFFu8; PACKET_SIZE];
        p[..4].copy_from_slice(&header);
        p
    }

    #[test]
    fn test_parse_header_fields() {
        let p = packet([0x47, 0x41, 0x00, 0x17]);
        let h = PacketHeader::parse(&p, 0).unwrap();
        assert_eq!(h.pid, 0x100);
        assert!(h.payload_unit_start);
        assert!(!h.has_adaptation);
        assert!(h.has_payload);
        assert_eq!(h.continuity_counter, 7);
        assert_eq!(h.payload(&p).len(), 184);
    }

    #[test]
    fn test_adaptation_field_discontinuity() {
        let mut p = packet([0x47, 0x01, 0x00, 0x32]);
        p[4] = 7;
        p[5] = 0x80;
        let h = PacketHeader::parse(&p, 188).unwrap();
        assert!(h.discontinuity);
        assert_eq!(h.payload_offset, 12);
        assert_eq!(h.continuity_counter, 2);
    }

    #[test]
    fn test_bad_sync_byte() {
        let p = packet([0x00, 0x00, 0x00, 0x10]);
        match PacketHeader::parse(&p, 376) {
            Err(Error::InvalidHeader { offset, actual, .. }) => {
                assert_eq!(offset, 376);
                assert_eq!(actual, "0x00");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_oversized_adaptation_field() {
        let mut p = packet([0x47, 0x00, 0x00, 0x30]);
        p[4] = 190;
        assert!(PacketHeader::parse(&p, 0).is_err());
    }
}
