//! Single-pass transport stream demultiplexer.
//!
//! One walk over the packets yields everything the verifier needs from a
//! segment: per-stream PES timestamps, ADTS frame counts, video access units
//! with keyframe flags and byte ranges, and continuity counter errors.

use std::collections::HashMap;

use tracing::trace;
use vodcheck_common::TrackKind;

use super::packet::{PacketHeader, NULL_PID, PACKET_SIZE, PAT_PID};
use super::pes::{count_adts_frames, PesHeader};
use super::psi::{parse_pat, parse_pmt, PmtStream};
use crate::{Error, Result};

const NAL_IDR_SLICE: u8 = 5;
const NAL_ACCESS_UNIT_DELIMITER: u8 = 9;

/// Bytes of video payload carried over between packets for start-code search.
const SCAN_TAIL: usize = 5;

/// Timestamps of one PES packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesUnit {
    /// Offset of the TS packet that starts this PES.
    pub offset: usize,
    pub pts: i64,
    /// Equal to `pts` when the header carries no separate DTS.
    pub dts: i64,
    /// ADTS frames in this PES, for audio streams.
    pub adts_frames: Option<u32>,
}

/// All PES packets seen for one stream id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesStream {
    pub stream_id: u8,
    pub track: TrackKind,
    pub units: Vec<PesUnit>,
}

/// A video access unit delimited by AUD NAL units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessUnit {
    /// Offset of the TS packet holding the start of the unit's PES.
    pub start: usize,
    /// End of the TS packet holding the unit's last byte.
    pub end: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub is_idr: bool,
}

impl AccessUnit {
    /// Byte length of `[start, end)`.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Non-sequential continuity counter on a PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuityError {
    pub pid: u16,
    pub packet_index: usize,
    pub expected: u8,
    pub found: u8,
}

impl std::fmt::Display for ContinuityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pid {:#06x} packet {}: expected cc {}, found {}",
            self.pid, self.packet_index, self.expected, self.found
        )
    }
}

/// Result of demultiplexing one segment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TsSummary {
    pub packet_count: usize,
    pub pmt_pid: Option<u16>,
    pub program_streams: Vec<PmtStream>,
    pub streams: Vec<PesStream>,
    pub access_units: Vec<AccessUnit>,
    pub continuity_errors: Vec<ContinuityError>,
}

impl TsSummary {
    /// First stream of the given kind.
    pub fn stream(&self, track: TrackKind) -> Option<&PesStream> {
        self.streams.iter().find(|s| s.track == track)
    }

    /// Access units that contain an IDR slice.
    pub fn keyframes(&self) -> impl Iterator<Item = &AccessUnit> {
        self.access_units.iter().filter(|au| au.is_idr)
    }
}

/// Demultiplex a whole segment.
pub fn demux(data: &[u8]) -> Result<TsSummary> {
    if data.len() % PACKET_SIZE != 0 {
        let whole = data.len() - data.len() % PACKET_SIZE;
        return Err(Error::truncated(
            "ts packet",
            whole,
            PACKET_SIZE,
            data.len() - whole,
        ));
    }
    let mut demuxer = Demuxer::default();
    for (index, packet) in data.chunks_exact(PACKET_SIZE).enumerate() {
        demuxer.push_packet(packet, index)?;
    }
    Ok(demuxer.finish())
}

struct PendingAudio {
    pid: u16,
    stream: usize,
    unit: Option<usize>,
    payload: Vec<u8>,
}

#[derive(Default)]
struct Demuxer {
    summary: TsSummary,
    counters: HashMap<u16, u8>,
    scan_pid: Option<u16>,
    pending_audio: Option<PendingAudio>,
    scanner: AccessUnitScanner,
}

impl Demuxer {
    fn push_packet(&mut self, packet: &[u8], index: usize) -> Result<()> {
        let offset = index * PACKET_SIZE;
        let header = PacketHeader::parse(packet, offset)?;
        self.summary.packet_count += 1;

        if header.pid == NULL_PID {
            return Ok(());
        }
        self.check_continuity(&header, index);

        let payload = header.payload(packet);
        let payload_offset = offset + header.payload_offset;
        if payload.is_empty() {
            return Ok(());
        }

        if header.pid == PAT_PID {
            if header.payload_unit_start {
                self.summary.pmt_pid = parse_pat(payload, payload_offset)?;
            }
            return Ok(());
        }
        if Some(header.pid) == self.summary.pmt_pid {
            if header.payload_unit_start {
                let streams = parse_pmt(payload, payload_offset)?;
                if let Some(video) = streams.iter().find(|s| s.is_video()) {
                    self.scan_pid = Some(video.pid);
                }
                self.summary.program_streams = streams;
            }
            return Ok(());
        }

        if !header.payload_unit_start {
            if let Some(pending) = self.pending_audio.as_mut() {
                if pending.pid == header.pid {
                    pending.payload.extend_from_slice(payload);
                }
            }
            if Some(header.pid) == self.scan_pid {
                self.scanner.feed(payload, offset);
            }
            return Ok(());
        }

        if !PesHeader::is_start(payload) {
            return Ok(());
        }
        let pes = PesHeader::parse(payload, payload_offset)?;
        let track = if pes.is_video() {
            TrackKind::Video
        } else if pes.is_audio() {
            TrackKind::Audio
        } else {
            return Ok(());
        };

        let stream = self.stream_index(pes.stream_id, track);
        let unit = pes.pts.map(|pts| {
            let units = &mut self.summary.streams[stream].units;
            units.push(PesUnit {
                offset,
                pts,
                dts: pes.dts.unwrap_or(pts),
                adts_frames: None,
            });
            units.len() - 1
        });
        let es = payload.get(pes.data_offset..).unwrap_or_default();

        if track == TrackKind::Audio {
            self.close_audio();
            self.pending_audio = Some(PendingAudio {
                pid: header.pid,
                stream,
                unit,
                payload: es.to_vec(),
            });
        } else {
            if self.scan_pid.is_none() && self.summary.pmt_pid.is_none() {
                self.scan_pid = Some(header.pid);
            }
            if Some(header.pid) == self.scan_pid {
                self.scanner.start_pes(offset, pes.pts, pes.dts.or(pes.pts));
                self.scanner.feed(es, offset);
            }
        }
        Ok(())
    }

    fn stream_index(&mut self, stream_id: u8, track: TrackKind) -> usize {
        if let Some(i) = self
            .summary
            .streams
            .iter()
            .position(|s| s.stream_id == stream_id)
        {
            return i;
        }
        self.summary.streams.push(PesStream {
            stream_id,
            track,
            units: Vec::new(),
        });
        self.summary.streams.len() - 1
    }

    fn close_audio(&mut self) {
        if let Some(pending) = self.pending_audio.take() {
            if let Some(unit) = pending.unit {
                let frames = count_adts_frames(&pending.payload);
                self.summary.streams[pending.stream].units[unit].adts_frames = Some(frames);
            }
        }
    }

    fn check_continuity(&mut self, header: &PacketHeader, index: usize) {
        let found = header.continuity_counter;
        let previous = self.counters.insert(header.pid, found);
        let Some(last) = previous else {
            return;
        };
        if header.discontinuity {
            return;
        }
        let expected = if header.has_payload {
            (last + 1) & 0x0F
        } else {
            last
        };
        // A repeated counter on a payload packet is a legal duplicate.
        if found == expected || (header.has_payload && found == last) {
            return;
        }
        trace!(pid = header.pid, index, expected, found, "continuity counter jump");
        self.summary.continuity_errors.push(ContinuityError {
            pid: header.pid,
            packet_index: index,
            expected,
            found,
        });
    }

    fn finish(mut self) -> TsSummary {
        self.close_audio();
        self.summary.access_units = self.scanner.finish();
        self.summary
    }
}

/// Tracks AUD/IDR start codes across packet boundaries.
#[derive(Default)]
struct AccessUnitScanner {
    /// Last few payload bytes with the offset of the packet carrying each.
    tail: Vec<(u8, usize)>,
    pes_offset: usize,
    pes_pts: Option<i64>,
    pes_dts: Option<i64>,
    last_packet_end: usize,
    current: Option<AccessUnit>,
    units: Vec<AccessUnit>,
}

impl AccessUnitScanner {
    fn start_pes(&mut self, offset: usize, pts: Option<i64>, dts: Option<i64>) {
        self.pes_offset = offset;
        self.pes_pts = pts;
        self.pes_dts = dts;
    }

    fn feed(&mut self, payload: &[u8], packet_offset: usize) {
        if payload.is_empty() {
            return;
        }
        let tail = std::mem::take(&mut self.tail);
        let tail_len = tail.len();
        let total = tail_len + payload.len();
        let byte_at = |i: usize| {
            if i < tail_len {
                tail[i].0
            } else {
                payload[i - tail_len]
            }
        };
        let packet_at = |i: usize| {
            if i < tail_len {
                tail[i].1
            } else {
                packet_offset
            }
        };

        // Codes fully inside the tail were handled by the previous call.
        let mut i = tail_len.saturating_sub(3);
        while i + 3 < total {
            if byte_at(i) != 0 || byte_at(i + 1) != 0 || byte_at(i + 2) != 1 {
                i += 1;
                continue;
            }
            match byte_at(i + 3) & 0x1F {
                NAL_IDR_SLICE => {
                    if let Some(au) = self.current.as_mut() {
                        au.is_idr = true;
                    }
                }
                NAL_ACCESS_UNIT_DELIMITER => {
                    let code_start = if i > 0 && byte_at(i - 1) == 0 { i - 1 } else { i };
                    let end = if code_start > 0 {
                        packet_at(code_start - 1) + PACKET_SIZE
                    } else {
                        self.last_packet_end
                    };
                    self.close(end);
                    self.current = Some(AccessUnit {
                        start: self.pes_offset,
                        end: self.pes_offset,
                        pts: self.pes_pts,
                        dts: self.pes_dts,
                        is_idr: false,
                    });
                }
                _ => {}
            }
            i += 3;
        }

        let keep_from = total.saturating_sub(SCAN_TAIL);
        self.tail = (keep_from..total).map(|i| (byte_at(i), packet_at(i))).collect();
        self.last_packet_end = packet_offset + PACKET_SIZE;
    }

    fn close(&mut self, end: usize) {
        if let Some(mut au) = self.current.take() {
            au.end = end.max(au.start);
            self.units.push(au);
        }
    }

    fn finish(mut self) -> Vec<AccessUnit> {
        let end = self.last_packet_end;
        self.close(end);
        self.units
    }
}
