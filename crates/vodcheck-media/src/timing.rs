//! Per-fragment timing extraction.
//!
//! Transport-stream and mux-packet fragments yield one record per
//! elementary stream, built from the decoded per-unit timestamps with the
//! final unit's duration extrapolated from the average spacing. Box-based
//! fragments carry a single track whose timing comes from the `trun` table.

use tracing::debug;
use vodcheck_common::{ContainerFormat, TimingInfo, TrackKind};

use crate::mp4::{BoxTree, Sidx, Tfdt, Tfhd, Tfxd, Trun};
use crate::mux::parse_mux_packets;
use crate::ts::{demux, PesStream, TsSummary};
use crate::{Error, Result};

/// Timing of one elementary stream within a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackTiming {
    pub track: TrackKind,
    pub timing: TimingInfo,
}

/// Extract timing from a fragment.
///
/// `track_hint` names the track of single-track box-based fragments; it is
/// ignored for multiplexed containers.
pub fn extract_timing(
    data: &[u8],
    container: ContainerFormat,
    track_hint: TrackKind,
) -> Result<Vec<TrackTiming>> {
    match container {
        ContainerFormat::TransportStream => Ok(timing_from_summary(&demux(data)?)),
        ContainerFormat::IsoBmff => Ok(vec![TrackTiming {
            track: track_hint,
            timing: iso_bmff_timing(data)?,
        }]),
        ContainerFormat::MuxPackets => mux_timing(data),
    }
}

/// Timing of every stream in an already demultiplexed transport stream.
pub fn timing_from_summary(summary: &TsSummary) -> Vec<TrackTiming> {
    summary
        .streams
        .iter()
        .filter_map(|stream| {
            pes_stream_timing(stream).map(|timing| TrackTiming {
                track: stream.track,
                timing,
            })
        })
        .collect()
}

fn pes_stream_timing(stream: &PesStream) -> Option<TimingInfo> {
    let dts: Vec<i64> = stream.units.iter().map(|u| u.dts).collect();
    let pts: Vec<i64> = stream.units.iter().map(|u| u.pts).collect();
    let weights: Option<Vec<u64>> = match stream.track {
        TrackKind::Audio => stream
            .units
            .iter()
            .map(|u| u.adts_frames.map(u64::from))
            .collect(),
        TrackKind::Video => None,
    };
    span_timing(&dts, &pts, weights.as_deref())
}

/// Build a timing record from decode/presentation timestamp lists.
///
/// The final unit's duration is the average spacing, or, when per-unit
/// frame counts are given, the last count times the average per-frame
/// duration of the preceding units.
fn span_timing(dts: &[i64], pts: &[i64], weights: Option<&[u64]>) -> Option<TimingInfo> {
    let (&first_dts, &last_dts) = (dts.first()?, dts.last()?);
    let start_pts = pts.iter().copied().min()?;
    let max_pts = pts.iter().copied().max()?;
    let n = dts.len();

    let last_duration = if n == 1 {
        0
    } else {
        let span = last_dts - first_dts;
        match weights {
            Some(counts) if counts.len() == n => {
                let preceding: u64 = counts[..n - 1].iter().sum();
                if preceding > 0 {
                    counts[n - 1] as i64 * (span / preceding as i64)
                } else {
                    span / (n as i64 - 1)
                }
            }
            _ => span / (n as i64 - 1),
        }
    };

    Some(TimingInfo::new(
        start_pts,
        first_dts,
        max_pts + last_duration,
        last_dts + last_duration,
    ))
}

/// Timing of a single-track `moof` fragment.
fn iso_bmff_timing(data: &[u8]) -> Result<TimingInfo> {
    let tree = BoxTree::parse(data)?;

    let trun_payload = tree
        .payload_at("moof.traf.trun")
        .ok_or_else(|| Error::unsupported("fragment has no moof.traf.trun box"))?;
    let trun = Trun::parse(trun_payload)?;
    if trun.samples.is_empty() {
        return Err(Error::unsupported("trun box has no samples"));
    }
    let first_cto = trun.first_composition_offset();

    let start_pts = if let Some(sidx) = tree.payload_at("sidx") {
        Sidx::parse(sidx)?.earliest_presentation_time as i64
    } else if let Some(tfxd) = find_tfxd(&tree)? {
        tfxd.absolute_time as i64
    } else if let Some(tfdt) = tree.payload_at("moof.traf.tfdt") {
        Tfdt::parse(tfdt)?.base_media_decode_time as i64 + first_cto
    } else {
        return Err(Error::unsupported(
            "fragment carries no sidx, tfxd or tfdt start time",
        ));
    };

    let default_duration = match tree.payload_at("moof.traf.tfhd") {
        Some(payload) => Tfhd::parse(payload)?.default_sample_duration,
        None => None,
    };

    let start_dts = start_pts - first_cto;
    let mut running_dts = start_dts;
    let mut end_pts = start_pts;
    for sample in &trun.samples {
        let duration = sample
            .duration
            .or(default_duration)
            .ok_or_else(|| Error::unsupported("trun sample has no duration and tfhd no default"))?;
        running_dts += duration as i64;
        end_pts = end_pts.max(running_dts + sample.composition_offset.unwrap_or(0));
    }
    debug!(
        samples = trun.samples.len(),
        start_pts, start_dts, end_pts, "box fragment timing"
    );

    Ok(TimingInfo::new(start_pts, start_dts, end_pts, running_dts))
}

fn find_tfxd(tree: &BoxTree<'_>) -> Result<Option<Tfxd>> {
    for path in ["moof.traf.uuid", "uuid"] {
        for node in tree.find_all(path) {
            if let Some(tfxd) = Tfxd::parse(tree.payload(node))? {
                return Ok(Some(tfxd));
            }
        }
    }
    Ok(None)
}

/// Timing of mux packets inside the fragment's `mdat`, in milliseconds.
fn mux_timing(data: &[u8]) -> Result<Vec<TrackTiming>> {
    let tree = BoxTree::parse(data)?;
    let mdat = tree
        .find("mdat")
        .ok_or_else(|| Error::unsupported("fragment has no mdat box"))?;
    let packets = parse_mux_packets(tree.payload(mdat), mdat.payload_start())?;

    let mut result = Vec::new();
    for track in [TrackKind::Video, TrackKind::Audio] {
        let frames: Vec<_> = packets
            .iter()
            .filter(|p| p.is_frame() && p.track() == Some(track))
            .collect();
        let dts: Vec<i64> = frames.iter().map(|p| p.dts()).collect();
        let pts: Vec<i64> = frames.iter().map(|p| p.pts()).collect();
        if let Some(timing) = span_timing(&dts, &pts, None) {
            result.push(TrackTiming { track, timing });
        }
    }
    Ok(result)
}
