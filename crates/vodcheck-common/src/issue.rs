//! Validation issues reported by a run.
//!
//! Issues are plain records: the validators never abort on the first one,
//! they accumulate everything and the caller decides what to do with the list.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{RenditionId, TrackKind};

/// Category of a reported issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    /// A fragment could not be fetched, decrypted or parsed.
    DecodeFailure,
    /// Transport-stream continuity counter jumped.
    ContinuityError,
    /// Start of a fragment does not meet the end of its predecessor.
    InStreamGap,
    /// Sibling renditions disagree on where a segment starts.
    CrossStreamGap,
    /// Server-declared keyframe index disagrees with the bitstream.
    KeyframeMismatch,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DecodeFailure => write!(f, "decode-failure"),
            Self::ContinuityError => write!(f, "continuity-error"),
            Self::InStreamGap => write!(f, "in-stream-gap"),
            Self::CrossStreamGap => write!(f, "cross-stream-gap"),
            Self::KeyframeMismatch => write!(f, "keyframe-mismatch"),
        }
    }
}

/// Which timeline exceeded the tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Clock {
    Pts,
    Dts,
    Both,
}

impl Clock {
    /// Combine independent pts/dts verdicts into a clock, if either failed.
    pub fn from_flags(pts: bool, dts: bool) -> Option<Self> {
        match (pts, dts) {
            (true, true) => Some(Self::Both),
            (true, false) => Some(Self::Pts),
            (false, true) => Some(Self::Dts),
            (false, false) => None,
        }
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pts => write!(f, "pts"),
            Self::Dts => write!(f, "dts"),
            Self::Both => write!(f, "pts+dts"),
        }
    }
}

/// One problem found during a run, with the coordinates it is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    /// Rendition the issue is attributed to. For cross-stream gaps this is
    /// the rendition holding the latest start.
    pub rendition: Option<RenditionId>,
    pub track: Option<TrackKind>,
    /// 1-based segment ordinal; 0 when the issue precedes any fragment.
    pub segment_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock: Option<Clock>,
    /// Measured deviation in native ticks.
    pub deviation: i64,
    /// Tolerance that was exceeded, in native ticks.
    pub tolerance: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub detail: String,
}

impl ValidationIssue {
    /// A fragment-scoped fetch/decrypt/parse failure.
    pub fn decode_failure(
        rendition: RenditionId,
        segment_index: u32,
        url: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind: IssueKind::DecodeFailure,
            rendition: Some(rendition),
            track: None,
            segment_index,
            clock: None,
            deviation: 0,
            tolerance: 0,
            url: Some(url.into()),
            detail: detail.into(),
        }
    }

    /// A continuity counter jump inside one fragment.
    pub fn continuity_error(
        rendition: RenditionId,
        segment_index: u32,
        url: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind: IssueKind::ContinuityError,
            ..Self::decode_failure(rendition, segment_index, url, detail)
        }
    }

    /// A gap or overlap between consecutive fragments of one stream.
    pub fn in_stream_gap(
        rendition: RenditionId,
        track: TrackKind,
        segment_index: u32,
        clock: Clock,
        deviation: i64,
        tolerance: i64,
    ) -> Self {
        Self {
            kind: IssueKind::InStreamGap,
            rendition: Some(rendition),
            track: Some(track),
            segment_index,
            clock: Some(clock),
            deviation,
            tolerance,
            url: None,
            detail: String::new(),
        }
    }

    /// Sibling renditions start the same segment at different times.
    pub fn cross_stream_gap(
        rendition: RenditionId,
        track: TrackKind,
        segment_index: u32,
        clock: Clock,
        deviation: i64,
        tolerance: i64,
    ) -> Self {
        Self {
            kind: IssueKind::CrossStreamGap,
            ..Self::in_stream_gap(rendition, track, segment_index, clock, deviation, tolerance)
        }
    }

    /// A declared keyframe entry that does not match the bitstream.
    pub fn keyframe_mismatch(
        rendition: RenditionId,
        segment_index: u32,
        url: impl Into<String>,
        deviation: i64,
        tolerance: i64,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind: IssueKind::KeyframeMismatch,
            rendition: Some(rendition),
            track: Some(TrackKind::Video),
            segment_index,
            clock: Some(Clock::Pts),
            deviation,
            tolerance,
            url: Some(url.into()),
            detail: detail.into(),
        }
    }

    /// Attach a URL to the issue.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Attach a free-text detail to the issue.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref clock) = self.clock {
            write!(f, " ({})", clock)?;
        }
        if let Some(ref rendition) = self.rendition {
            write!(f, " rendition={}", rendition)?;
        }
        if let Some(ref track) = self.track {
            write!(f, " track={}", track)?;
        }
        write!(f, " segment={}", self.segment_index)?;
        if self.tolerance > 0 {
            write!(f, " deviation={} tolerance={}", self.deviation, self.tolerance)?;
        }
        if !self.detail.is_empty() {
            write!(f, " {}", self.detail)?;
        }
        if let Some(ref url) = self.url {
            write!(f, " url={}", url)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_from_flags() {
        assert_eq!(Clock::from_flags(true, true), Some(Clock::Both));
        assert_eq!(Clock::from_flags(false, true), Some(Clock::Dts));
        assert_eq!(Clock::from_flags(false, false), None);
    }

    #[test]
    fn test_issue_display() {
        let issue = ValidationIssue::in_stream_gap(
            RenditionId::new("800000"),
            TrackKind::Video,
            4,
            Clock::Dts,
            1500,
            1000,
        );
        assert_eq!(
            issue.to_string(),
            "in-stream-gap (dts) rendition=800000 track=video segment=4 deviation=1500 tolerance=1000"
        );
    }

    #[test]
    fn test_decode_failure_carries_url() {
        let issue = ValidationIssue::decode_failure(
            RenditionId::new("r1"),
            2,
            "http://example.com/seg-2.ts",
            "HTTP 404",
        );
        assert_eq!(issue.kind, IssueKind::DecodeFailure);
        assert_eq!(issue.url.as_deref(), Some("http://example.com/seg-2.ts"));
        assert!(issue.to_string().contains("HTTP 404"));
    }

    #[test]
    fn test_issue_kind_ordering_matches_report_order() {
        let mut kinds = vec![
            IssueKind::KeyframeMismatch,
            IssueKind::InStreamGap,
            IssueKind::DecodeFailure,
            IssueKind::CrossStreamGap,
            IssueKind::ContinuityError,
        ];
        kinds.sort();
        assert_eq!(kinds[0], IssueKind::DecodeFailure);
        assert_eq!(kinds[4], IssueKind::KeyframeMismatch);
    }
}
