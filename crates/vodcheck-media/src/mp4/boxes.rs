//! Typed readers for the fragment boxes that carry timing.
//!
//! Each reader takes the box payload (everything after the size/tag header).

use crate::bitstream::ByteReader;
use crate::{Error, Result};

/// Extended type of the smooth-streaming fragment time box.
pub const TFXD_GUID: [u8; 16] = [
    0x6d, 0x1d, 0x9b, 0x05, 0x42, 0xd5, 0x44, 0xe6, 0x80, 0xe2, 0x14, 0x1d, 0xaf, 0xf7, 0x57, 0xb2,
];

/// Upper bound for a `trun` whose entries carry no fields at all.
const MAX_FIELDLESS_SAMPLES: usize = 1 << 20;

fn version_and_flags(r: &mut ByteReader<'_>) -> Result<(u8, u32)> {
    let word = r.read_u32()?;
    Ok(((word >> 24) as u8, word & 0x00FF_FFFF))
}

/// Segment index box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sidx {
    pub version: u8,
    pub reference_id: u32,
    pub timescale: u32,
    pub earliest_presentation_time: u64,
}

impl Sidx {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let (version, _) = version_and_flags(&mut r)?;
        let reference_id = r.read_u32()?;
        let timescale = r.read_u32()?;
        let earliest_presentation_time = if version == 0 {
            r.read_u32()? as u64
        } else {
            r.read_u64()?
        };
        Ok(Self {
            version,
            reference_id,
            timescale,
            earliest_presentation_time,
        })
    }
}

/// Track fragment decode time box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tfdt {
    pub base_media_decode_time: u64,
}

impl Tfdt {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let (version, _) = version_and_flags(&mut r)?;
        let base_media_decode_time = if version == 1 {
            r.read_u64()?
        } else {
            r.read_u32()? as u64
        };
        Ok(Self {
            base_media_decode_time,
        })
    }
}

/// Track fragment header; only the defaults relevant to timing are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tfhd {
    pub flags: u32,
    pub track_id: u32,
    pub default_sample_duration: Option<u32>,
}

impl Tfhd {
    const BASE_DATA_OFFSET: u32 = 0x01;
    const SAMPLE_DESCRIPTION_INDEX: u32 = 0x02;
    const DEFAULT_SAMPLE_DURATION: u32 = 0x08;

    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let (_, flags) = version_and_flags(&mut r)?;
        let track_id = r.read_u32()?;
        if flags & Self::BASE_DATA_OFFSET != 0 {
            r.skip(8)?;
        }
        if flags & Self::SAMPLE_DESCRIPTION_INDEX != 0 {
            r.skip(4)?;
        }
        let default_sample_duration = if flags & Self::DEFAULT_SAMPLE_DURATION != 0 {
            Some(r.read_u32()?)
        } else {
            None
        };
        Ok(Self {
            flags,
            track_id,
            default_sample_duration,
        })
    }
}

/// One `trun` sample entry. Absent fields were not present in the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrunSample {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    pub composition_offset: Option<i64>,
}

/// Track run box, decoded according to its flag word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trun {
    pub version: u8,
    pub flags: u32,
    pub data_offset: Option<i32>,
    pub first_sample_flags: Option<u32>,
    pub samples: Vec<TrunSample>,
}

impl Trun {
    pub const DATA_OFFSET: u32 = 0x001;
    pub const FIRST_SAMPLE_FLAGS: u32 = 0x004;
    pub const SAMPLE_DURATION: u32 = 0x100;
    pub const SAMPLE_SIZE: u32 = 0x200;
    pub const SAMPLE_FLAGS: u32 = 0x400;
    pub const SAMPLE_COMPOSITION_OFFSET: u32 = 0x800;

    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload);
        let (version, flags) = version_and_flags(&mut r)?;
        let sample_count = r.read_u32()? as usize;

        let data_offset = if flags & Self::DATA_OFFSET != 0 {
            Some(r.read_i32()?)
        } else {
            None
        };
        let first_sample_flags = if flags & Self::FIRST_SAMPLE_FLAGS != 0 {
            Some(r.read_u32()?)
        } else {
            None
        };

        let per_sample = [
            Self::SAMPLE_DURATION,
            Self::SAMPLE_SIZE,
            Self::SAMPLE_FLAGS,
            Self::SAMPLE_COMPOSITION_OFFSET,
        ]
        .iter()
        .filter(|bit| flags & **bit != 0)
        .count()
            * 4;
        if per_sample > 0 && sample_count > r.remaining() / per_sample {
            return Err(Error::truncated(
                "trun samples",
                r.position(),
                sample_count * per_sample,
                r.remaining(),
            ));
        }

        if per_sample == 0 && sample_count > MAX_FIELDLESS_SAMPLES {
            return Err(Error::invalid_box(
                0,
                format!("trun declares {} samples without per-sample fields", sample_count),
            ));
        }

        let mut samples = Vec::with_capacity(sample_count);
        for _ in 0..sample_count {
            let mut sample = TrunSample::default();
            if flags & Self::SAMPLE_DURATION != 0 {
                sample.duration = Some(r.read_u32()?);
            }
            if flags & Self::SAMPLE_SIZE != 0 {
                sample.size = Some(r.read_u32()?);
            }
            if flags & Self::SAMPLE_FLAGS != 0 {
                sample.flags = Some(r.read_u32()?);
            }
            if flags & Self::SAMPLE_COMPOSITION_OFFSET != 0 {
                sample.composition_offset = Some(if version == 0 {
                    r.read_u32()? as i64
                } else {
                    r.read_i32()? as i64
                });
            }
            samples.push(sample);
        }

        Ok(Self {
            version,
            flags,
            data_offset,
            first_sample_flags,
            samples,
        })
    }

    /// Composition offset of the first sample, zero when not signalled.
    pub fn first_composition_offset(&self) -> i64 {
        self.samples
            .first()
            .and_then(|s| s.composition_offset)
            .unwrap_or(0)
    }
}

/// Smooth-streaming absolute fragment time, carried in a `uuid` box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tfxd {
    pub absolute_time: u64,
    pub duration: u64,
}

impl Tfxd {
    /// Parse a `uuid` payload, returning `None` when the extended type is
    /// some other private box.
    pub fn parse(payload: &[u8]) -> Result<Option<Self>> {
        if payload.len() < 16 || payload[..16] != TFXD_GUID {
            return Ok(None);
        }
        let mut r = ByteReader::with_base(&payload[16..], 16);
        let (version, _) = version_and_flags(&mut r)?;
        let (absolute_time, duration) = if version == 1 {
            (r.read_u64()?, r.read_u64()?)
        } else {
            (r.read_u32()? as u64, r.read_u32()? as u64)
        };
        Ok(Some(Self {
            absolute_time,
            duration,
        }))
    }
}
