//! Smooth-fragment manifest enumeration.
//!
//! Every `StreamIndex` of type video or audio yields one rendition per
//! `QualityLevel`. Chunk start times come from the `c` elements: an explicit
//! `t` resets the clock, `d` advances it and `r` is the total number of
//! chunks the element stands for. A quality level repeating an earlier
//! bitrate is ignored.

use tracing::{debug, info};
use vodcheck_common::{ContainerFormat, RenditionId, TrackKind};

use crate::error::{ManifestError, Result};
use crate::model::{
    resolve_url, Enumeration, Fragment, Manifest, Rendition, MAX_FRAGMENTS_PER_RENDITION,
};
use crate::xml::{parse_document, Element};

const DEFAULT_TIMESCALE: u64 = 10_000_000;

/// Expand the bitrate and start-time placeholders of a fragment URL template.
pub fn expand_url(template: &str, bitrate: u64, start_time: u64) -> String {
    let bitrate = bitrate.to_string();
    let start_time = start_time.to_string();
    template
        .replace("{bitrate}", &bitrate)
        .replace("{Bitrate}", &bitrate)
        .replace("{start time}", &start_time)
        .replace("{start_time}", &start_time)
}

/// Chunk start times and durations of one stream index.
fn chunk_times(url: &str, stream: &Element) -> Result<Vec<(u64, u64)>> {
    let mut out = Vec::new();
    let mut time = 0u64;
    for c in stream.children_named("c") {
        if let Some(t) = c.attr("t").and_then(|v| v.parse().ok()) {
            time = t;
        }
        let d: u64 = c.attr("d").and_then(|v| v.parse().ok()).unwrap_or(0);
        let count: u64 = c
            .attr("r")
            .and_then(|v| v.parse().ok())
            .filter(|r| *r > 0)
            .unwrap_or(1);
        if count > MAX_FRAGMENTS_PER_RENDITION.saturating_sub(out.len() as u64) {
            return Err(ManifestError::parse(
                url,
                format!("chunk list expands past {} chunks", MAX_FRAGMENTS_PER_RENDITION),
            ));
        }
        for _ in 0..count {
            out.push((time, d));
            time = time
                .checked_add(d)
                .ok_or_else(|| ManifestError::parse(url, "chunk start time overflows"))?;
        }
    }
    Ok(out)
}

/// Enumerate a smooth-fragment manifest.
pub fn enumerate(manifest: &Manifest) -> Result<Enumeration> {
    let root = parse_document(&manifest.url, &manifest.body)?;
    if root.name != "SmoothStreamingMedia" {
        return Err(ManifestError::parse(
            &manifest.url,
            "root element is not SmoothStreamingMedia",
        ));
    }
    let root_timescale = root
        .attr("TimeScale")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_TIMESCALE);

    let mut enumeration = Enumeration::new(manifest.format, &manifest.url);
    for stream in root.children_named("StreamIndex") {
        let kind = stream.attr("Type").unwrap_or("").to_ascii_lowercase();
        let track = match kind.as_str() {
            "video" => TrackKind::Video,
            "audio" => TrackKind::Audio,
            _ => {
                let name = stream.attr("Name").unwrap_or(kind.as_str());
                enumeration.skip(
                    format!("{}#{}", manifest.url, name),
                    format!("{} streams are not verified", kind),
                );
                continue;
            }
        };
        let Some(template) = stream.attr("Url") else {
            enumeration.skip(&manifest.url, format!("{} stream without Url", kind));
            continue;
        };
        let timescale = stream
            .attr("TimeScale")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|t| *t > 0)
            .unwrap_or(root_timescale)
            .max(1);
        let chunks = chunk_times(&manifest.url, stream)?;

        let mut bitrates: Vec<u64> = Vec::new();
        for level in stream.children_named("QualityLevel") {
            let bitrate = level
                .attr("Bitrate")
                .and_then(|b| b.parse::<u64>().ok())
                .unwrap_or(0);
            // Levels with the same bitrate expand to the same fragment URLs.
            if bitrates.contains(&bitrate) {
                debug!(stream = %kind, bitrate, "duplicate quality level ignored");
                continue;
            }
            bitrates.push(bitrate);
            let id = enumeration.unique_id(RenditionId::new(format!("{}-{}", kind, bitrate)));
            let mut rendition = Rendition::new(id, track, ContainerFormat::IsoBmff);
            rendition.bandwidth = Some(bitrate);
            for (i, &(start, duration)) in chunks.iter().enumerate() {
                let url = resolve_url(&manifest.url, &expand_url(template, bitrate, start))?;
                rendition.fragments.push(
                    Fragment::new(url, i as u32 + 1)
                        .with_duration(duration as f64 / timescale as f64),
                );
            }
            enumeration.renditions.push(rendition);
        }
    }

    info!(
        renditions = enumeration.renditions.len(),
        fragments = enumeration.fragment_count(),
        "smooth manifest enumerated"
    );
    Ok(enumeration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vodcheck_common::ManifestFormat;

    const URL: &str = "http://h/asset.ism/Manifest";

    const BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<SmoothStreamingMedia MajorVersion="2" MinorVersion="0" Duration="60000000">
  <StreamIndex Type="video" Name="video" Chunks="3"
      Url="QualityLevels({bitrate})/Fragments(video={start time})">
    <QualityLevel Index="0" Bitrate="800000" FourCC="H264"/>
    <QualityLevel Index="1" Bitrate="1600000" FourCC="H264"/>
    <c t="0" d="20000000" r="2"/>
    <c d="20000000"/>
  </StreamIndex>
  <StreamIndex Type="audio" Name="audio" Url="QualityLevels({Bitrate})/Fragments(audio={start_time})">
    <QualityLevel Index="0" Bitrate="128000" FourCC="AACL"/>
    <c t="100" d="30000000"/>
    <c d="30000000"/>
  </StreamIndex>
  <StreamIndex Type="text" Name="subs" Url="x"/>
</SmoothStreamingMedia>"#;

    #[test]
    fn test_expand_url() {
        assert_eq!(
            expand_url("QualityLevels({bitrate})/Fragments(video={start time})", 500, 40),
            "QualityLevels(500)/Fragments(video=40)"
        );
    }

    #[test]
    fn test_enumerate_streams_and_levels() {
        let manifest = Manifest::new(ManifestFormat::SmoothFragment, URL, BODY);
        let e = enumerate(&manifest).unwrap();

        let ids: Vec<_> = e.renditions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["video-800000", "video-1600000", "audio-128000"]);

        let video = &e.renditions[0];
        assert_eq!(video.fragments.len(), 3);
        assert_eq!(
            video.fragments[2].url,
            "http://h/asset.ism/QualityLevels(800000)/Fragments(video=40000000)"
        );
        assert_eq!(video.fragments[2].duration, Some(2.0));
        assert_eq!(video.container, ContainerFormat::IsoBmff);

        let audio = &e.renditions[2];
        assert_eq!(audio.track, TrackKind::Audio);
        assert_eq!(
            audio.fragments[1].url,
            "http://h/asset.ism/QualityLevels(128000)/Fragments(audio=30000100)"
        );

        assert_eq!(e.skipped.len(), 1);
        assert!(e.skipped[0].url.ends_with("#subs"));
    }

    #[test]
    fn test_duplicate_bitrates_enumerated_once() {
        let body = r#"<SmoothStreamingMedia>
  <StreamIndex Type="video" Url="QualityLevels({bitrate})/Fragments(video={start time})">
    <QualityLevel Index="0" Bitrate="800000" FourCC="H264"/>
    <QualityLevel Index="1" Bitrate="800000" FourCC="AVC1"/>
    <QualityLevel Index="2" Bitrate="1600000" FourCC="H264"/>
    <c t="0" d="20000000" r="2"/>
  </StreamIndex>
</SmoothStreamingMedia>"#;
        let manifest = Manifest::new(ManifestFormat::SmoothFragment, URL, body);
        let e = enumerate(&manifest).unwrap();

        let ids: Vec<_> = e.renditions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["video-800000", "video-1600000"]);
        assert_eq!(e.fragment_count(), 4);
    }

    #[test]
    fn test_runaway_chunk_repeat_rejected() {
        let body = r#"<SmoothStreamingMedia>
  <StreamIndex Type="video" Url="QualityLevels({bitrate})/Fragments(video={start time})">
    <QualityLevel Index="0" Bitrate="800000"/>
    <c t="0" d="1" r="4000000000"/>
  </StreamIndex>
</SmoothStreamingMedia>"#;
        let manifest = Manifest::new(ManifestFormat::SmoothFragment, URL, body);
        assert!(matches!(enumerate(&manifest), Err(ManifestError::Parse { .. })));
    }

    #[test]
    fn test_chunk_time_overflow_rejected() {
        let body = r#"<SmoothStreamingMedia>
  <StreamIndex Type="audio" Url="QualityLevels({bitrate})/Fragments(audio={start time})">
    <QualityLevel Index="0" Bitrate="128000"/>
    <c t="18446744073709551610" d="4" r="3"/>
  </StreamIndex>
</SmoothStreamingMedia>"#;
        let manifest = Manifest::new(ManifestFormat::SmoothFragment, URL, body);
        assert!(matches!(enumerate(&manifest), Err(ManifestError::Parse { .. })));
    }

    #[test]
    fn test_wrong_root() {
        let manifest = Manifest::new(ManifestFormat::SmoothFragment, URL, "<MPD/>");
        assert!(matches!(enumerate(&manifest), Err(ManifestError::Parse { .. })));
    }
}
