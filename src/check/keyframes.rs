//! Cross-check of a declared keyframe index against the bitstream.

use std::collections::HashMap;

use vodcheck_common::{RenditionId, ValidationIssue};
use vodcheck_manifest::SegmentKeyframes;
use vodcheck_media::ts::TsSummary;

/// Compares declared keyframes segment by segment.
///
/// Demuxed keyframe times are taken relative to the first keyframe of the
/// first checked segment, so one checker must see the segments of a keyframe
/// playlist in order.
#[derive(Debug, Clone)]
pub struct KeyframeChecker {
    tolerance: i64,
    base_pts: Option<i64>,
}

impl KeyframeChecker {
    pub fn new(tolerance: i64) -> Self {
        Self {
            tolerance,
            base_pts: None,
        }
    }

    /// Match every declared keyframe of `declared` by `(offset, length)`
    /// against the IDR access units in `summary`.
    pub fn check_segment(
        &mut self,
        rendition: &RenditionId,
        segment_index: u32,
        declared: &SegmentKeyframes,
        summary: &TsSummary,
    ) -> Vec<ValidationIssue> {
        let mut actual: HashMap<(u64, u64), i64> = HashMap::new();
        for unit in summary.keyframes() {
            let Some(pts) = unit.pts else {
                continue;
            };
            let base = *self.base_pts.get_or_insert(pts);
            actual.insert((unit.start as u64, unit.len() as u64), pts - base);
        }

        let mut issues = Vec::new();
        for keyframe in &declared.keyframes {
            match actual.get(&(keyframe.offset, keyframe.length)) {
                None => issues.push(ValidationIssue::keyframe_mismatch(
                    rendition.clone(),
                    segment_index,
                    &declared.url,
                    0,
                    self.tolerance,
                    format!(
                        "no keyframe at offset {} length {}",
                        keyframe.offset, keyframe.length
                    ),
                )),
                Some(&pts) => {
                    let deviation = keyframe.pts - pts;
                    if deviation.abs() > self.tolerance {
                        issues.push(ValidationIssue::keyframe_mismatch(
                            rendition.clone(),
                            segment_index,
                            &declared.url,
                            deviation,
                            self.tolerance,
                            format!(
                                "keyframe at offset {} declared at {} but decodes at {}",
                                keyframe.offset, keyframe.pts, pts
                            ),
                        ));
                    }
                }
            }
        }
        issues
    }
}
