//! Core type definitions for formats, tracks and timing.
//!
//! All enums serialize in kebab-case so JSON reports read the same way the
//! human summary does.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Reference tick rate that validation thresholds are expressed in.
pub const REFERENCE_TIMESCALE: u32 = 90_000;

/// Elementary stream kind inside a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackKind {
    /// Video elementary stream.
    Video,
    /// Audio elementary stream.
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// Delivery format of a manifest, selected once from the response content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestFormat {
    /// Line-oriented master/media playlists (`.m3u8`).
    SegmentedPlaylist,
    /// XML period/adaptation-set/representation tree with segment templates.
    TemplateManifest,
    /// XML manifest with an embedded run-length encoded bootstrap table.
    BootstrapIndexed,
    /// XML stream-index/quality-level manifest with `c` chunk elements.
    SmoothFragment,
}

impl ManifestFormat {
    /// Map a response `Content-Type` to a format.
    ///
    /// Parameters after `;` are ignored and matching is case-insensitive.
    pub fn from_content_type(content_type: &str) -> Result<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "application/vnd.apple.mpegurl" | "application/x-mpegurl" => {
                Ok(Self::SegmentedPlaylist)
            }
            "application/dash+xml" => Ok(Self::TemplateManifest),
            "video/f4m" => Ok(Self::BootstrapIndexed),
            "text/xml" => Ok(Self::SmoothFragment),
            _ => Err(Error::unsupported_content_type(content_type)),
        }
    }

    /// Native tick rate of timestamps recovered from this format's fragments.
    pub fn timescale(&self) -> u32 {
        match self {
            Self::SegmentedPlaylist | Self::TemplateManifest => 90_000,
            Self::BootstrapIndexed => 1_000,
            Self::SmoothFragment => 10_000_000,
        }
    }

    /// Scale a threshold expressed in 90 kHz ticks to this format's timescale.
    ///
    /// Rounds down but never returns less than one tick.
    pub fn scale_threshold(&self, reference_ticks: i64) -> i64 {
        let scaled = reference_ticks.saturating_mul(self.timescale() as i64)
            / REFERENCE_TIMESCALE as i64;
        scaled.max(1)
    }
}

impl fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SegmentedPlaylist => write!(f, "segmented-playlist"),
            Self::TemplateManifest => write!(f, "template-manifest"),
            Self::BootstrapIndexed => write!(f, "bootstrap-indexed"),
            Self::SmoothFragment => write!(f, "smooth-fragment"),
        }
    }
}

/// Binary container of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerFormat {
    /// MPEG transport stream (188-byte packets).
    TransportStream,
    /// ISO-BMFF box tree (`moof`/`traf`/`trun`).
    IsoBmff,
    /// Box tree whose `mdat` carries interleaved 11-byte-header mux packets.
    MuxPackets,
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportStream => write!(f, "transport-stream"),
            Self::IsoBmff => write!(f, "iso-bmff"),
            Self::MuxPackets => write!(f, "mux-packets"),
        }
    }
}

/// Presentation and decode time span of one fragment, in the container's
/// native ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingInfo {
    pub start_pts: i64,
    pub start_dts: i64,
    pub end_pts: i64,
    pub end_dts: i64,
}

impl TimingInfo {
    /// Create a timing record.
    pub fn new(start_pts: i64, start_dts: i64, end_pts: i64, end_dts: i64) -> Self {
        Self {
            start_pts,
            start_dts,
            end_pts,
            end_dts,
        }
    }

    /// Whether both spans are non-negative in length.
    ///
    /// Only malformed input produces a record that fails this check.
    pub fn is_well_formed(&self) -> bool {
        self.end_dts >= self.start_dts && self.end_pts >= self.start_pts
    }

    /// Decode duration in ticks.
    pub fn dts_duration(&self) -> i64 {
        self.end_dts - self.start_dts
    }

    /// Shift all four timestamps by `ticks`.
    pub fn shifted(&self, ticks: i64) -> Self {
        Self::new(
            self.start_pts + ticks,
            self.start_dts + ticks,
            self.end_pts + ticks,
            self.end_dts + ticks,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_content_type() {
        assert_eq!(
            ManifestFormat::from_content_type("application/x-mpegURL").unwrap(),
            ManifestFormat::SegmentedPlaylist
        );
        assert_eq!(
            ManifestFormat::from_content_type("application/dash+xml; charset=utf-8").unwrap(),
            ManifestFormat::TemplateManifest
        );
        assert_eq!(
            ManifestFormat::from_content_type("video/f4m").unwrap(),
            ManifestFormat::BootstrapIndexed
        );
        assert_eq!(
            ManifestFormat::from_content_type("text/xml").unwrap(),
            ManifestFormat::SmoothFragment
        );
        assert!(ManifestFormat::from_content_type("text/html").is_err());
    }

    #[test]
    fn test_threshold_scaling() {
        assert_eq!(ManifestFormat::SegmentedPlaylist.scale_threshold(1000), 1000);
        assert_eq!(ManifestFormat::BootstrapIndexed.scale_threshold(1000), 11);
        assert_eq!(ManifestFormat::SmoothFragment.scale_threshold(1000), 111_111);
        assert_eq!(ManifestFormat::BootstrapIndexed.scale_threshold(10), 1);
    }

    #[test]
    fn test_timing_well_formed() {
        assert!(TimingInfo::new(0, 0, 10, 10).is_well_formed());
        assert!(!TimingInfo::new(10, 0, 5, 10).is_well_formed());
        assert_eq!(TimingInfo::new(100, 90, 200, 190).dts_duration(), 100);
    }

    #[test]
    fn test_timing_shifted() {
        let t = TimingInfo::new(0, -10, 100, 90).shifted(50);
        assert_eq!(t, TimingInfo::new(50, 40, 150, 140));
    }

    #[test]
    fn test_kebab_case_serialization() {
        let json = serde_json::to_string(&ManifestFormat::BootstrapIndexed).unwrap();
        assert_eq!(json, "\"bootstrap-indexed\"");
        let json = serde_json::to_string(&ContainerFormat::TransportStream).unwrap();
        assert_eq!(json, "\"transport-stream\"");
    }
}
