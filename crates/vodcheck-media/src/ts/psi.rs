//! Program association and program map tables.

use crate::bitstream::ByteReader;
use crate::{Error, Result};

pub const STREAM_TYPE_AVC: u8 = 0x1B;
const AUDIO_STREAM_TYPES: &[u8] = &[0x03, 0x04, 0x0F, 0x11];

/// One elementary stream declared by a PMT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: u8,
    pub pid: u16,
}

impl PmtStream {
    pub fn is_video(&self) -> bool {
        self.stream_type == STREAM_TYPE_AVC
    }

    pub fn is_audio(&self) -> bool {
        AUDIO_STREAM_TYPES.contains(&self.stream_type)
    }
}

/// Skip the pointer field and read the 12-bit section length.
fn section_body<'a>(payload: &'a [u8], offset: usize) -> Result<(ByteReader<'a>, usize)> {
    let mut r = ByteReader::with_base(payload, offset);
    let pointer = r.read_u8()? as usize;
    r.skip(pointer)?;
    let _table_id = r.read_u8()?;
    let section_length = (r.read_u16()? & 0x0FFF) as usize;
    Ok((r, section_length))
}

/// Return the PMT PID for program 1, else for the first real program.
pub fn parse_pat(payload: &[u8], offset: usize) -> Result<Option<u16>> {
    let (mut r, section_length) = section_body(payload, offset)?;
    if section_length < 9 {
        return Err(Error::invalid_table(
            offset,
            format!("PAT section length {} too short", section_length),
        ));
    }
    // transport_stream_id, version, section_number, last_section_number
    r.skip(5)?;

    let entries = (section_length - 9) / 4;
    let mut first = None;
    for _ in 0..entries {
        let program = r.read_u16()?;
        let pid = r.read_u16()? & 0x1FFF;
        if program == 1 {
            return Ok(Some(pid));
        }
        if program != 0 && first.is_none() {
            first = Some(pid);
        }
    }
    Ok(first)
}

/// Elementary streams listed in a PMT section.
pub fn parse_pmt(payload: &[u8], offset: usize) -> Result<Vec<PmtStream>> {
    let (mut r, section_length) = section_body(payload, offset)?;
    if section_length < 13 {
        return Err(Error::invalid_table(
            offset,
            format!("PMT section length {} too short", section_length),
        ));
    }
    // program_number, version, section_number, last_section_number, pcr_pid
    r.skip(7)?;
    let program_info_length = (r.read_u16()? & 0x0FFF) as usize;
    r.skip(program_info_length)?;

    let mut remaining = section_length
        .checked_sub(13 + program_info_length)
        .ok_or_else(|| Error::invalid_table(offset, "PMT program info exceeds section"))?;

    let mut streams = Vec::new();
    while remaining >= 5 {
        let stream_type = r.read_u8()?;
        let pid = r.read_u16()? & 0x1FFF;
        let es_info_length = (r.read_u16()? & 0x0FFF) as usize;
        r.skip(es_info_length)?;
        streams.push(PmtStream { stream_type, pid });
        remaining = remaining.saturating_sub(5 + es_info_length);
    }
    Ok(streams)
}
