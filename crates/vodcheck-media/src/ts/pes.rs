//! PES header timestamps and ADTS frame counting.

use crate::bitstream::{BitReader, ByteReader};
use crate::{Error, Result};

const PES_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// Timestamps and layout of a PES packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesHeader {
    pub stream_id: u8,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    /// Offset of the elementary stream data, relative to the PES start.
    pub data_offset: usize,
}

impl PesHeader {
    /// Whether `data` starts with a PES start code.
    pub fn is_start(data: &[u8]) -> bool {
        data.starts_with(&PES_START_CODE)
    }

    /// Parse the PES header at the start of `data`, which sits at `offset`
    /// in the segment.
    pub fn parse(data: &[u8], offset: usize) -> Result<Self> {
        let mut r = ByteReader::with_base(data, offset);
        let prefix = r.slice(3)?;
        if prefix != PES_START_CODE {
            return Err(Error::invalid_header(
                "pes start code",
                offset,
                "000001",
                format!("{:02x}{:02x}{:02x}", prefix[0], prefix[1], prefix[2]),
            ));
        }
        let stream_id = r.read_u8()?;
        let _packet_length = r.read_u16()?;
        let _marker_flags = r.read_u8()?;
        let flags = r.read_u8()?;
        let header_data_length = r.read_u8()? as usize;
        let fields = r.slice(header_data_length)?;

        let has_pts = flags & 0x80 != 0;
        let has_dts = flags & 0x40 != 0;

        let mut pts = None;
        let mut dts = None;
        if has_pts {
            pts = Some(read_timestamp(fields, offset + 9)?);
            if has_dts {
                dts = Some(read_timestamp(fields.get(5..).unwrap_or_default(), offset + 14)?);
            }
        }

        Ok(Self {
            stream_id,
            pts,
            dts,
            data_offset: 9 + header_data_length,
        })
    }

    pub fn is_video(&self) -> bool {
        (0xE0..=0xEF).contains(&self.stream_id)
    }

    pub fn is_audio(&self) -> bool {
        (0xC0..=0xDF).contains(&self.stream_id)
    }
}

/// Decode a 33-bit timestamp: 4 prefix bits, then 3/15/15 bit groups each
/// followed by a marker bit.
pub fn read_timestamp(data: &[u8], offset: usize) -> Result<i64> {
    if data.len() < 5 {
        return Err(Error::truncated("pes timestamp", offset, 5, data.len()));
    }
    let mut bits = BitReader::new(&data[..5]);
    bits.skip_bits(4)?;
    let high = bits.read_bits(3)?;
    bits.skip_bits(1)?;
    let mid = bits.read_bits(15)?;
    bits.skip_bits(1)?;
    let low = bits.read_bits(15)?;
    Ok(((high << 30) | (mid << 15) | low) as i64)
}

/// Count ADTS frames in an audio PES payload.
///
/// Stops at the first position without a sync word or with a zero frame
/// length.
pub fn count_adts_frames(data: &[u8]) -> u32 {
    let mut pos = 0;
    let mut count = 0;
    while pos + 7 <= data.len() {
        let mut bits = BitReader::new(&data[pos..pos + 7]);
        let sync = bits.read_bits(12).unwrap_or(0);
        if sync != 0xFFF {
            break;
        }
        let frame_length = bits
            .skip_bits(18)
            .and_then(|_| bits.read_bits(13))
            .unwrap_or(0) as usize;
        count += 1;
        if frame_length == 0 {
            break;
        }
        pos += frame_length;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{adts_frame, encode_timestamp};

    #[test]
    fn test_timestamp_round_trip_33_bits() {
        let value = (1i64 << 32) + 12_345;
        let raw = encode_timestamp(0x2, value);
        assert_eq!(read_timestamp(&raw, 0).unwrap(), value);
    }

    #[test]
    fn test_pes_header_with_pts_and_dts() {
        let mut data = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0xC0, 10];
        data.extend_from_slice(&encode_timestamp(0x3, 183_000));
        data.extend_from_slice(&encode_timestamp(0x1, 180_000));
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x09]);

        let header = PesHeader::parse(&data, 0).unwrap();
        assert!(header.is_video());
        assert_eq!(header.pts, Some(183_000));
        assert_eq!(header.dts, Some(180_000));
        assert_eq!(header.data_offset, 19);
    }

    #[test]
    fn test_pes_header_truncated() {
        let data = [0x00, 0x00, 0x01, 0xC0, 0x00, 0x00, 0x80, 0x80, 5, 0x21];
        assert!(matches!(
            PesHeader::parse(&data, 188),
            Err(Error::Truncated { offset: 197, .. })
        ));
    }

    #[test]
    fn test_count_adts_frames() {
        let mut data = adts_frame(20);
        data.extend(adts_frame(30));
        data.extend(adts_frame(12));
        assert_eq!(count_adts_frames(&data), 3);
        assert_eq!(count_adts_frames(&[0u8; 16]), 0);
    }
}
