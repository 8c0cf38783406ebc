//! Gap and overlap detection over recovered fragment timing.
//!
//! In-stream: within one `(rendition, track)` stream, each fragment must start
//! where its predecessor ended. Cross-stream: sibling renditions must start a
//! given `(segment, track)` at the same time. PTS and DTS are judged
//! independently; a coordinate failing on either yields a single issue.

use std::collections::BTreeMap;

use serde::Serialize;
use vodcheck_common::{Clock, RenditionId, TimingInfo, TrackKind, ValidationIssue};

/// Timing of one track of one fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Observation {
    pub rendition: RenditionId,
    /// Position of the rendition in the enumeration, for stable ordering.
    pub rendition_order: usize,
    pub segment_index: u32,
    pub track: TrackKind,
    pub timing: TimingInfo,
}

/// Compare a pts and a dts deviation against `threshold`.
///
/// Returns the failing clock and the larger exceeded deviation.
fn judge(pts_deviation: i64, dts_deviation: i64, threshold: i64) -> Option<(Clock, i64)> {
    let pts_fail = pts_deviation.abs() > threshold;
    let dts_fail = dts_deviation.abs() > threshold;
    let clock = Clock::from_flags(pts_fail, dts_fail)?;
    let deviation = match clock {
        Clock::Pts => pts_deviation,
        Clock::Dts => dts_deviation,
        Clock::Both if pts_deviation.abs() >= dts_deviation.abs() => pts_deviation,
        Clock::Both => dts_deviation,
    };
    Some((clock, deviation))
}

/// Flag fragments whose start is more than `threshold` ticks away from the
/// end of the preceding segment of the same stream.
///
/// Only directly adjacent segment indexes are compared, so sampled fragment
/// lists do not produce spurious gaps.
pub fn check_in_stream(observations: &[Observation], threshold: i64) -> Vec<ValidationIssue> {
    let mut streams: BTreeMap<(usize, TrackKind), Vec<&Observation>> = BTreeMap::new();
    for obs in observations {
        streams
            .entry((obs.rendition_order, obs.track))
            .or_default()
            .push(obs);
    }

    let mut issues = Vec::new();
    for stream in streams.values_mut() {
        stream.sort_by_key(|o| o.segment_index);
        for pair in stream.windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            if prev.segment_index.checked_add(1) != Some(cur.segment_index) {
                continue;
            }
            let pts = cur.timing.start_pts.saturating_sub(prev.timing.end_pts);
            let dts = cur.timing.start_dts.saturating_sub(prev.timing.end_dts);
            if let Some((clock, deviation)) = judge(pts, dts, threshold) {
                issues.push(ValidationIssue::in_stream_gap(
                    cur.rendition.clone(),
                    cur.track,
                    cur.segment_index,
                    clock,
                    deviation,
                    threshold,
                ));
            }
        }
    }
    issues
}

/// Flag segments whose start differs across sibling renditions by more than
/// `threshold` ticks. The issue names the rendition with the latest start.
pub fn check_cross_stream(observations: &[Observation], threshold: i64) -> Vec<ValidationIssue> {
    let mut groups: BTreeMap<(u32, TrackKind), Vec<&Observation>> = BTreeMap::new();
    for obs in observations {
        groups
            .entry((obs.segment_index, obs.track))
            .or_default()
            .push(obs);
    }

    let mut issues = Vec::new();
    for ((segment_index, track), group) in groups {
        if group.len() < 2 {
            continue;
        }
        let spread = |start: fn(&Observation) -> i64| {
            let min = group.iter().map(|o| start(o)).min().unwrap_or(0);
            let max = group.iter().map(|o| start(o)).max().unwrap_or(0);
            max - min
        };
        let pts = spread(|o| o.timing.start_pts);
        let dts = spread(|o| o.timing.start_dts);
        let Some((clock, deviation)) = judge(pts, dts, threshold) else {
            continue;
        };
        let latest = match clock {
            Clock::Dts => group.iter().max_by_key(|o| (o.timing.start_dts, o.rendition_order)),
            _ => group.iter().max_by_key(|o| (o.timing.start_pts, o.rendition_order)),
        };
        if let Some(latest) = latest {
            issues.push(ValidationIssue::cross_stream_gap(
                latest.rendition.clone(),
                track,
                segment_index,
                clock,
                deviation,
                threshold,
            ));
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use vodcheck_common::IssueKind;

    fn obs(rendition: usize, segment: u32, timing: TimingInfo) -> Observation {
        Observation {
            rendition: RenditionId::from_ordinal(rendition),
            rendition_order: rendition,
            segment_index: segment,
            track: TrackKind::Video,
            timing,
        }
    }

    /// Contiguous 10 s segments at 90 kHz, shifted by `offset`.
    fn contiguous(rendition: usize, count: u32, offset: i64) -> Vec<Observation> {
        (1..=count)
            .map(|i| {
                let start = (i as i64 - 1) * 900_000 + offset;
                obs(rendition, i, TimingInfo::new(start, start, start + 900_000, start + 900_000))
            })
            .collect()
    }

    #[test]
    fn test_contiguous_stream_is_clean() {
        let observations = contiguous(1, 5, 0);
        assert!(check_in_stream(&observations, 1000).is_empty());
    }

    #[test]
    fn test_gap_boundary_is_exclusive() {
        for delta in [1000, -1000] {
            let mut observations = contiguous(1, 2, 0);
            observations[1].timing = observations[1].timing.shifted(delta);
            assert!(check_in_stream(&observations, 1000).is_empty(), "delta {}", delta);
        }
        for delta in [1001, -1001] {
            let mut observations = contiguous(1, 2, 0);
            observations[1].timing = observations[1].timing.shifted(delta);
            let issues = check_in_stream(&observations, 1000);
            assert_eq!(issues.len(), 1, "delta {}", delta);
            assert_eq!(issues[0].kind, IssueKind::InStreamGap);
            assert_eq!(issues[0].clock, Some(Clock::Both));
            assert_eq!(issues[0].deviation, delta);
            assert_eq!(issues[0].segment_index, 2);
        }
    }

    #[test]
    fn test_dts_only_gap() {
        let mut observations = contiguous(1, 2, 0);
        observations[1].timing.start_dts += 3000;
        let issues = check_in_stream(&observations, 1000);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].clock, Some(Clock::Dts));
        assert_eq!(issues[0].deviation, 3000);
    }

    #[test]
    fn test_non_adjacent_segments_not_compared() {
        let mut observations = contiguous(1, 4, 0);
        observations.remove(1);
        observations[1].timing = observations[1].timing.shifted(50_000);
        // 1 -> 3 is skipped; 3 -> 4 sees the shift.
        let issues = check_in_stream(&observations, 1000);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].segment_index, 4);
    }

    #[test]
    fn test_highest_segment_index_does_not_overflow() {
        let timing = |start: i64| TimingInfo::new(start, start, start + 900_000, start + 900_000);
        let observations = vec![
            obs(1, u32::MAX - 1, timing(0)),
            obs(1, u32::MAX, timing(905_000)),
            obs(1, u32::MAX, timing(900_000)),
        ];
        let issues = check_in_stream(&observations, 1000);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].segment_index, u32::MAX);
        assert_eq!(issues[0].deviation, 5000);
    }

    #[test]
    fn test_cross_stream_within_threshold() {
        let mut observations = contiguous(1, 3, 0);
        observations.extend(contiguous(2, 3, 50));
        assert!(check_cross_stream(&observations, 1000).is_empty());
    }

    #[test]
    fn test_cross_stream_names_latest_rendition() {
        let mut observations = contiguous(1, 3, 0);
        let mut second = contiguous(2, 3, 50);
        second[1].timing = second[1].timing.shifted(1500);
        observations.extend(second);

        let issues = check_cross_stream(&observations, 1000);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::CrossStreamGap);
        assert_eq!(issues[0].segment_index, 2);
        assert_eq!(issues[0].deviation, 1550);
        assert_eq!(issues[0].rendition, Some(RenditionId::from_ordinal(2)));
    }

    #[test]
    fn test_tracks_are_separate_streams() {
        let mut observations = contiguous(1, 2, 0);
        let mut audio = contiguous(1, 2, 90_000);
        for o in &mut audio {
            o.track = TrackKind::Audio;
        }
        observations.extend(audio);
        assert!(check_in_stream(&observations, 1000).is_empty());
        assert!(check_cross_stream(&observations, 1000).is_empty());
    }
}
