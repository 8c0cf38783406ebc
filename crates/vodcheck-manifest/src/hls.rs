//! Segmented-playlist (`.m3u8`) enumeration.
//!
//! A master playlist's variant and alternate-media references are fetched
//! and expanded as media playlists; a media playlist's URI lines are the
//! fragments. References resolve against the URL of the response that
//! carried them.

use tracing::{debug, info};
use vodcheck_common::{ContainerFormat, RenditionId, TrackKind};
use vodcheck_media::crypto::parse_iv;

use crate::error::{ManifestError, Result};
use crate::fetch::{ByteRange, FetchContext};
use crate::model::{
    resolve_url, Encryption, Enumeration, Fragment, Manifest, Rendition, SideResourceKind,
};

/// Parsed `NAME=value` attribute list. Quoted values may contain commas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeList(Vec<(String, String)>);

impl AttributeList {
    pub fn parse(input: &str) -> Self {
        let mut attrs = Vec::new();
        let mut rest = input.trim();
        while !rest.is_empty() {
            let Some(eq) = rest.find('=') else {
                break;
            };
            let name = rest[..eq].trim().to_string();
            rest = &rest[eq + 1..];
            let value;
            if let Some(quoted) = rest.strip_prefix('"') {
                let end = quoted.find('"').unwrap_or(quoted.len());
                value = quoted[..end].to_string();
                rest = quoted.get(end + 1..).unwrap_or("");
                rest = rest.find(',').map(|i| &rest[i + 1..]).unwrap_or("");
            } else {
                let end = rest.find(',').unwrap_or(rest.len());
                value = rest[..end].trim().to_string();
                rest = rest.get(end + 1..).unwrap_or("");
            }
            attrs.push((name, value));
            rest = rest.trim_start();
        }
        Self(attrs)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Whether a playlist body is a media playlist rather than a master.
pub fn is_media_playlist(body: &str) -> bool {
    body.contains("#EXTINF") || body.contains("#EXT-X-TARGETDURATION")
}

/// Parse `len[@offset]`; a missing offset continues from `previous_end`.
fn parse_byte_range(value: &str, previous_end: u64) -> Option<ByteRange> {
    let mut parts = value.trim().splitn(2, '@');
    let length = parts.next()?.trim().parse().ok()?;
    let offset = match parts.next() {
        Some(off) => off.trim().parse().ok()?,
        None => previous_end,
    };
    Some(ByteRange::new(offset, length))
}

fn parse_extinf(value: &str) -> Option<f64> {
    value.split(',').next()?.trim().parse().ok()
}

/// Contents of one media playlist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaPlaylist {
    pub fragments: Vec<Fragment>,
    pub init_url: Option<String>,
    pub media_sequence: Option<u64>,
    pub target_duration: Option<f64>,
    pub key_urls: Vec<String>,
}

impl MediaPlaylist {
    pub fn container(&self) -> ContainerFormat {
        if self.init_url.is_some() {
            ContainerFormat::IsoBmff
        } else {
            ContainerFormat::TransportStream
        }
    }
}

/// Parse a media playlist fetched from `base_url`.
pub fn parse_media_playlist(body: &str, base_url: &str) -> Result<MediaPlaylist> {
    let mut playlist = MediaPlaylist::default();
    let mut duration = None;
    let mut range = None;
    let mut previous_end = 0u64;
    let mut key: Option<Encryption> = None;

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(value) = line.strip_prefix("#EXTINF:") {
            duration = parse_extinf(value);
        } else if let Some(value) = line.strip_prefix("#EXT-X-BYTERANGE:") {
            range = parse_byte_range(value, previous_end);
            if range.is_none() {
                return Err(ManifestError::parse(base_url, format!("bad byte range {:?}", value)));
            }
        } else if let Some(value) = line.strip_prefix("#EXT-X-KEY:") {
            let attrs = AttributeList::parse(value);
            let method = attrs.get("METHOD").unwrap_or("NONE");
            key = match (method, attrs.get("URI")) {
                ("NONE", _) | (_, None) => None,
                (method, Some(uri)) => {
                    let key_url = resolve_url(base_url, uri)?;
                    if !playlist.key_urls.contains(&key_url) {
                        playlist.key_urls.push(key_url.clone());
                    }
                    let iv = match attrs.get("IV") {
                        Some(value) => Some(parse_iv(value).ok_or_else(|| {
                            ManifestError::parse(base_url, format!("bad key IV {:?}", value))
                        })?),
                        None => None,
                    };
                    Some(Encryption {
                        method: method.to_string(),
                        key_url,
                        iv,
                    })
                }
            };
        } else if let Some(value) = line.strip_prefix("#EXT-X-MAP:") {
            if let Some(uri) = AttributeList::parse(value).get("URI") {
                playlist.init_url = Some(resolve_url(base_url, uri)?);
            }
        } else if let Some(value) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
            playlist.media_sequence = value.trim().parse().ok();
        } else if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
            playlist.target_duration = value.trim().parse().ok();
        } else if line.starts_with('#') {
            continue;
        } else {
            let index = playlist.fragments.len() as u32 + 1;
            let mut fragment = Fragment::new(resolve_url(base_url, line)?, index);
            fragment.duration = duration.take();
            fragment.byte_range = range.take();
            if let Some(r) = fragment.byte_range {
                previous_end = r.end();
            }
            fragment.encryption = key.clone();
            playlist.fragments.push(fragment);
        }
    }
    Ok(playlist)
}

/// Kind of reference found in a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MasterEntry {
    Variant {
        url: String,
        bandwidth: Option<u64>,
        track: TrackKind,
    },
    Media {
        url: String,
        id: Option<String>,
        track: Option<TrackKind>,
        kind: String,
    },
    KeyframeIndex(String),
    Other(String),
}

fn track_from_codecs(codecs: Option<&str>) -> TrackKind {
    match codecs {
        Some(c) if !c.contains("avc") && !c.contains("hvc") && !c.contains("hev") && c.contains("mp4a") => {
            TrackKind::Audio
        }
        _ => TrackKind::Video,
    }
}

fn parse_master(body: &str, base_url: &str) -> Result<Vec<MasterEntry>> {
    let mut entries = Vec::new();
    let mut pending: Option<AttributeList> = None;

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(value) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            pending = Some(AttributeList::parse(value));
        } else if let Some(value) = line.strip_prefix("#EXT-X-I-FRAME-STREAM-INF:") {
            if let Some(uri) = AttributeList::parse(value).get("URI") {
                entries.push(MasterEntry::KeyframeIndex(resolve_url(base_url, uri)?));
            }
        } else if let Some(value) = line.strip_prefix("#EXT-X-MEDIA:") {
            let attrs = AttributeList::parse(value);
            if let Some(uri) = attrs.get("URI") {
                let kind = attrs.get("TYPE").unwrap_or("").to_ascii_uppercase();
                let id = match (attrs.get("GROUP-ID"), attrs.get("NAME")) {
                    (Some(g), Some(n)) => Some(format!("{}/{}", g, n)),
                    (Some(g), None) => Some(g.to_string()),
                    (None, Some(n)) => Some(n.to_string()),
                    (None, None) => None,
                };
                let track = match kind.as_str() {
                    "AUDIO" => Some(TrackKind::Audio),
                    "VIDEO" => Some(TrackKind::Video),
                    _ => None,
                };
                entries.push(MasterEntry::Media {
                    url: resolve_url(base_url, uri)?,
                    id,
                    track,
                    kind,
                });
            }
        } else if line.starts_with('#') {
            if let Some(uri) = line
                .split_once(':')
                .and_then(|(_, v)| AttributeList::parse(v).get("URI").map(str::to_string))
            {
                entries.push(MasterEntry::Other(resolve_url(base_url, &uri)?));
            }
        } else {
            let attrs = pending.take().unwrap_or_default();
            entries.push(MasterEntry::Variant {
                url: resolve_url(base_url, line)?,
                bandwidth: attrs.get("BANDWIDTH").and_then(|b| b.parse().ok()),
                track: track_from_codecs(attrs.get("CODECS")),
            });
        }
    }
    Ok(entries)
}

fn add_media_playlist(
    enumeration: &mut Enumeration,
    id: RenditionId,
    bandwidth: Option<u64>,
    track: TrackKind,
    playlist: MediaPlaylist,
) {
    let mut rendition = Rendition::new(enumeration.unique_id(id), track, playlist.container());
    rendition.bandwidth = bandwidth;
    rendition.encryption = playlist.fragments.first().and_then(|f| f.encryption.clone());
    rendition.init_url = playlist.init_url.clone();
    if let Some(init) = &playlist.init_url {
        enumeration.add_side_resource(SideResourceKind::Init, init.clone());
    }
    for key in &playlist.key_urls {
        enumeration.add_side_resource(SideResourceKind::Key, key.clone());
    }
    debug!(
        rendition = %rendition.id,
        fragments = playlist.fragments.len(),
        "media playlist expanded"
    );
    rendition.fragments = playlist.fragments;
    enumeration.renditions.push(rendition);
}

/// Enumerate a master or media playlist.
pub async fn enumerate(ctx: &FetchContext<'_>, manifest: &Manifest) -> Result<Enumeration> {
    let mut enumeration = Enumeration::new(manifest.format, &manifest.url);

    if is_media_playlist(&manifest.body) {
        let playlist = parse_media_playlist(&manifest.body, &manifest.url)?;
        add_media_playlist(
            &mut enumeration,
            RenditionId::from_ordinal(1),
            None,
            TrackKind::Video,
            playlist,
        );
        return Ok(enumeration);
    }

    let entries = parse_master(&manifest.body, &manifest.url)?;
    let mut ordinal = 0;
    for entry in entries {
        let (url, id, bandwidth, track) = match entry {
            MasterEntry::KeyframeIndex(url) => {
                enumeration.add_side_resource(SideResourceKind::KeyframeIndex, url);
                continue;
            }
            MasterEntry::Other(url) => {
                enumeration.add_side_resource(SideResourceKind::Other, url);
                continue;
            }
            MasterEntry::Media { url, track: None, kind, .. } => {
                enumeration.skip(url, format!("{} renditions are not verified", kind));
                continue;
            }
            MasterEntry::Media {
                url,
                id,
                track: Some(track),
                ..
            } => {
                ordinal += 1;
                let id = id
                    .map(RenditionId::new)
                    .unwrap_or_else(|| RenditionId::from_ordinal(ordinal));
                (url, id, None, track)
            }
            MasterEntry::Variant {
                url,
                bandwidth,
                track,
            } => {
                ordinal += 1;
                let id = bandwidth
                    .map(RenditionId::from_bandwidth)
                    .unwrap_or_else(|| RenditionId::from_ordinal(ordinal));
                (url, id, bandwidth, track)
            }
        };

        let response = match ctx.get(&url).await {
            Ok(response) => response,
            Err(err) => {
                enumeration.skip(url, err);
                continue;
            }
        };
        let body = response.text();
        if !is_media_playlist(&body) {
            enumeration.skip(url, "nested playlist is not a media playlist");
            continue;
        }
        let playlist = parse_media_playlist(&body, &response.url)?;
        add_media_playlist(&mut enumeration, id, bandwidth, track, playlist);
    }

    info!(
        renditions = enumeration.renditions.len(),
        fragments = enumeration.fragment_count(),
        skipped = enumeration.skipped.len(),
        "playlist enumerated"
    );
    Ok(enumeration)
}

/// One keyframe declared by an I-frame playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaredKeyframe {
    /// Cumulative playlist time at 90 kHz.
    pub pts: i64,
    pub offset: u64,
    pub length: u64,
}

/// Keyframes of one segment, in playlist order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentKeyframes {
    pub url: String,
    pub keyframes: Vec<DeclaredKeyframe>,
}

/// Parse an I-frame playlist into per-segment keyframe lists, ordered by
/// first appearance of each segment URL.
pub fn parse_iframe_playlist(body: &str, base_url: &str) -> Result<Vec<SegmentKeyframes>> {
    if !body.trim_start().starts_with("#EXTM3U") {
        return Err(ManifestError::parse(base_url, "keyframe index is not a playlist"));
    }
    let mut segments: Vec<SegmentKeyframes> = Vec::new();
    let mut elapsed = 0.0f64;
    let mut duration = 0.0f64;
    let mut range: Option<ByteRange> = None;
    let mut previous_end = 0u64;

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(value) = line.strip_prefix("#EXTINF:") {
            elapsed += duration;
            duration = parse_extinf(value).unwrap_or(0.0);
        } else if let Some(value) = line.strip_prefix("#EXT-X-BYTERANGE:") {
            range = parse_byte_range(value, previous_end);
        } else if !line.starts_with('#') {
            let Some(r) = range.take() else {
                return Err(ManifestError::parse(
                    base_url,
                    format!("keyframe entry {} has no byte range", line),
                ));
            };
            previous_end = r.end();
            let url = resolve_url(base_url, line)?;
            let keyframe = DeclaredKeyframe {
                pts: (elapsed * 90_000.0).round() as i64,
                offset: r.offset,
                length: r.length,
            };
            match segments.iter_mut().find(|s| s.url == url) {
                Some(segment) => segment.keyframes.push(keyframe),
                None => segments.push(SegmentKeyframes {
                    url,
                    keyframes: vec![keyframe],
                }),
            }
        }
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::StaticFetcher;
    use vodcheck_common::ManifestFormat;

    const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000,CODECS=\"avc1.64001f,mp4a.40.2\"
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1600000
high/index.m3u8
#EXT-X-MEDIA:TYPE=SUBTITLES,GROUP-ID=\"subs\",NAME=\"en\",URI=\"subs/en.m3u8\"
#EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=100000,URI=\"low/iframes.m3u8\"
";

    const MEDIA: &str = "#EXTM3U
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:1
#EXT-X-KEY:METHOD=AES-128,URI=\"../keys/k1.key\"
#EXTINF:10.0,
seg-1.ts
#EXTINF:10.0,
seg-2.ts
#EXT-X-KEY:METHOD=AES-128,URI=\"../keys/k1.key\",IV=0x00000000000000000000000000000009
#EXTINF:9.5,
seg-3.ts
#EXT-X-ENDLIST
";

    #[test]
    fn test_attribute_list_quoted_commas() {
        let attrs = AttributeList::parse(
            "BANDWIDTH=800000,CODECS=\"avc1.64001f,mp4a.40.2\",RESOLUTION=640x360",
        );
        assert_eq!(attrs.get("bandwidth"), Some("800000"));
        assert_eq!(attrs.get("CODECS"), Some("avc1.64001f,mp4a.40.2"));
        assert_eq!(attrs.get("RESOLUTION"), Some("640x360"));
    }

    #[test]
    fn test_media_playlist_keys_and_durations() {
        let playlist = parse_media_playlist(MEDIA, "http://h/a/low/index.m3u8").unwrap();
        assert_eq!(playlist.fragments.len(), 3);
        assert_eq!(playlist.media_sequence, Some(1));
        let third = &playlist.fragments[2];
        assert_eq!(third.url, "http://h/a/low/seg-3.ts");
        assert_eq!(third.segment_index, 3);
        assert_eq!(third.duration, Some(9.5));
        let key = third.encryption.as_ref().unwrap();
        assert_eq!(key.key_url, "http://h/a/keys/k1.key");
        assert_eq!(key.iv.unwrap()[15], 9);
        assert!(playlist.fragments[0].encryption.as_ref().unwrap().iv.is_none());
        assert_eq!(playlist.key_urls.len(), 1);
        assert_eq!(playlist.container(), ContainerFormat::TransportStream);
    }

    #[test]
    fn test_malformed_key_iv_rejected() {
        for iv in ["0xZZ", "0x", "0x000000000000000000000000000000001"] {
            let body = format!(
                "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"k.key\",IV={}\n#EXTINF:4,\ns1.ts\n",
                iv
            );
            assert!(
                matches!(
                    parse_media_playlist(&body, "http://h/v/index.m3u8"),
                    Err(ManifestError::Parse { .. })
                ),
                "iv {}",
                iv
            );
        }
    }

    #[test]
    fn test_byte_ranges_continue_from_previous() {
        let body = "#EXTM3U\n#EXT-X-TARGETDURATION:4\n#EXT-X-MAP:URI=\"init.mp4\"\n\
                    #EXTINF:4,\n#EXT-X-BYTERANGE:1000@200\nmain.mp4\n\
                    #EXTINF:4,\n#EXT-X-BYTERANGE:500\nmain.mp4\n";
        let playlist = parse_media_playlist(body, "http://h/v/index.m3u8").unwrap();
        assert_eq!(playlist.init_url.as_deref(), Some("http://h/v/init.mp4"));
        assert_eq!(playlist.container(), ContainerFormat::IsoBmff);
        assert_eq!(playlist.fragments[1].byte_range, Some(ByteRange::new(1200, 500)));
    }

    #[tokio::test]
    async fn test_master_expands_variants() {
        let fetcher = StaticFetcher::new()
            .with("http://h/a/low/index.m3u8", "application/x-mpegurl", MEDIA)
            .with("http://h/a/high/index.m3u8", "application/x-mpegurl", MEDIA);
        let ctx = FetchContext::new(&fetcher, Vec::new());
        let manifest = Manifest::new(
            ManifestFormat::SegmentedPlaylist,
            "http://h/a/master.m3u8",
            MASTER,
        );

        let e = enumerate(&ctx, &manifest).await.unwrap();
        assert_eq!(e.renditions.len(), 2);
        assert_eq!(e.renditions[0].id.as_str(), "800000");
        assert_eq!(e.renditions[1].id.as_str(), "1600000");
        assert_eq!(e.renditions[1].fragments[0].url, "http://h/a/high/seg-1.ts");
        assert_eq!(e.fragment_urls().len(), 6);
        assert_eq!(
            e.side_resources_of(SideResourceKind::KeyframeIndex).collect::<Vec<_>>(),
            vec!["http://h/a/low/iframes.m3u8"]
        );
        assert_eq!(e.side_resources_of(SideResourceKind::Key).count(), 1);
        assert_eq!(e.skipped.len(), 1);
        assert_eq!(e.skipped[0].url, "http://h/a/subs/en.m3u8");
    }

    #[tokio::test]
    async fn test_unreachable_variant_is_skipped() {
        let fetcher = StaticFetcher::new()
            .with("http://h/a/low/index.m3u8", "application/x-mpegurl", MEDIA);
        let ctx = FetchContext::new(&fetcher, Vec::new());
        let manifest = Manifest::new(
            ManifestFormat::SegmentedPlaylist,
            "http://h/a/master.m3u8",
            MASTER,
        );
        let e = enumerate(&ctx, &manifest).await.unwrap();
        assert_eq!(e.renditions.len(), 1);
        assert!(e.skipped.iter().any(|s| s.url == "http://h/a/high/index.m3u8"));
    }

    #[test]
    fn test_iframe_playlist_grouping() {
        let body = "#EXTM3U
#EXT-X-I-FRAMES-ONLY
#EXTINF:4.0,
#EXT-X-BYTERANGE:1316@376
seg-1.ts
#EXTINF:6.0,
#EXT-X-BYTERANGE:1504@90000
seg-1.ts
#EXTINF:10.0,
#EXT-X-BYTERANGE:1316@376
seg-2.ts
";
        let segments = parse_iframe_playlist(body, "http://h/a/low/iframes.m3u8").unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].url, "http://h/a/low/seg-1.ts");
        assert_eq!(
            segments[0].keyframes,
            vec![
                DeclaredKeyframe { pts: 0, offset: 376, length: 1316 },
                DeclaredKeyframe { pts: 360_000, offset: 90_000, length: 1504 },
            ]
        );
        assert_eq!(segments[1].keyframes[0].pts, 900_000);
        assert!(parse_iframe_playlist("<html>", "http://h/").is_err());
    }
}
