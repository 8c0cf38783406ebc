//! Enumeration output.

use serde::Serialize;
use url::Url;
use vodcheck_common::{ContainerFormat, ManifestFormat, RenditionId, TrackKind};

use crate::error::{ManifestError, Result};
use crate::fetch::{ByteRange, FetchResponse};
use crate::sampling::sample_evenly;

/// Upper bound on the fragments a single manifest entry may expand to.
pub const MAX_FRAGMENTS_PER_RENDITION: u64 = 1_000_000;

/// A fetched manifest, ready for enumeration.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub format: ManifestFormat,
    /// URL of the response that carried the body.
    pub url: String,
    pub body: String,
}

impl Manifest {
    pub fn new(format: ManifestFormat, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            format,
            url: url.into(),
            body: body.into(),
        }
    }

    /// Select the format from the response's content type.
    pub fn from_response(response: &FetchResponse) -> Result<Self> {
        let content_type = response
            .content_type()
            .ok_or_else(|| ManifestError::UnsupportedContentType(String::new()))?;
        let format = ManifestFormat::from_content_type(content_type)?;
        Ok(Self::new(format, &response.url, response.text()))
    }
}

/// Segment encryption declared by the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Encryption {
    /// Declared method, e.g. `AES-128`.
    pub method: String,
    pub key_url: String,
    /// Explicit IV; when absent it is derived from the segment index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iv: Option<[u8; 16]>,
}

impl Encryption {
    pub fn is_aes128(&self) -> bool {
        self.method.eq_ignore_ascii_case("AES-128")
    }
}

/// One addressable fragment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    pub url: String,
    /// Position within the rendition. 1-based ordinal for playlists, template
    /// and smooth manifests; the fragment number for bootstrap-indexed ones.
    pub segment_index: u32,
    /// Duration declared by the manifest in seconds. A hint only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_range: Option<ByteRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<Encryption>,
}

impl Fragment {
    pub fn new(url: impl Into<String>, segment_index: u32) -> Self {
        Self {
            url: url.into(),
            segment_index,
            duration: None,
            byte_range: None,
            encryption: None,
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }
}

/// One quality/bitrate/track variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rendition {
    pub id: RenditionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<u64>,
    /// Track carried by single-track fragments; multiplexed containers
    /// report their own tracks.
    pub track: TrackKind,
    pub container: ContainerFormat,
    pub fragments: Vec<Fragment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_url: Option<String>,
    /// Encryption in effect at the first fragment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<Encryption>,
}

impl Rendition {
    pub fn new(id: RenditionId, track: TrackKind, container: ContainerFormat) -> Self {
        Self {
            id,
            bandwidth: None,
            track,
            container,
            fragments: Vec::new(),
            init_url: None,
            encryption: None,
        }
    }

    /// Keep at most `max` fragments, evenly spaced and always including the
    /// first and last. Zero keeps everything.
    pub fn sample_fragments(&mut self, max: usize) {
        self.fragments = sample_evenly(&self.fragments, max);
    }
}

/// Kind of a non-fragment resource referenced by a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SideResourceKind {
    Key,
    Init,
    Bootstrap,
    KeyframeIndex,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideResource {
    pub kind: SideResourceKind,
    pub url: String,
}

/// A nested reference that could not be expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedReference {
    pub url: String,
    pub reason: String,
}

/// Everything a manifest makes addressable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enumeration {
    pub format: ManifestFormat,
    pub manifest_url: String,
    pub renditions: Vec<Rendition>,
    pub side_resources: Vec<SideResource>,
    pub skipped: Vec<SkippedReference>,
}

impl Enumeration {
    pub fn new(format: ManifestFormat, manifest_url: impl Into<String>) -> Self {
        Self {
            format,
            manifest_url: manifest_url.into(),
            renditions: Vec::new(),
            side_resources: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Flat ordered list of every fragment URL.
    pub fn fragment_urls(&self) -> Vec<&str> {
        self.renditions
            .iter()
            .flat_map(|r| r.fragments.iter().map(|f| f.url.as_str()))
            .collect()
    }

    pub fn fragment_count(&self) -> usize {
        self.renditions.iter().map(|r| r.fragments.len()).sum()
    }

    /// Record a side resource once.
    pub fn add_side_resource(&mut self, kind: SideResourceKind, url: impl Into<String>) {
        let url = url.into();
        if !self.side_resources.iter().any(|s| s.url == url) {
            self.side_resources.push(SideResource { kind, url });
        }
    }

    pub fn side_resources_of(&self, kind: SideResourceKind) -> impl Iterator<Item = &str> {
        self.side_resources
            .iter()
            .filter(move |s| s.kind == kind)
            .map(|s| s.url.as_str())
    }

    pub fn skip(&mut self, url: impl Into<String>, reason: impl ToString) {
        let url = url.into();
        let reason = reason.to_string();
        tracing::warn!(%url, %reason, "skipping reference");
        self.skipped.push(SkippedReference { url, reason });
    }

    /// Rendition id not yet taken, derived from `preferred`.
    pub fn unique_id(&self, preferred: RenditionId) -> RenditionId {
        if !self.renditions.iter().any(|r| r.id == preferred) {
            return preferred;
        }
        let mut n = 2;
        loop {
            let candidate = RenditionId::new(format!("{}-{}", preferred, n));
            if !self.renditions.iter().any(|r| r.id == candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Resolve `reference` against `base` per RFC 3986.
pub fn resolve_url(base: &str, reference: &str) -> Result<String> {
    let url_error = |message: String| ManifestError::Url {
        base: base.to_string(),
        reference: reference.to_string(),
        message,
    };
    let base_url = Url::parse(base).map_err(|e| url_error(e.to_string()))?;
    base_url
        .join(reference.trim())
        .map(String::from)
        .map_err(|e| url_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("http://h/a/b/master.m3u8?tok=1", "720/index.m3u8").unwrap(),
            "http://h/a/b/720/index.m3u8"
        );
        assert_eq!(
            resolve_url("http://h/a/b/index.m3u8", "/abs/seg-1.ts").unwrap(),
            "http://h/abs/seg-1.ts"
        );
        assert_eq!(
            resolve_url("http://h/a/index.m3u8", "https://cdn/x.ts").unwrap(),
            "https://cdn/x.ts"
        );
        assert!(matches!(
            resolve_url("not a url", "x.ts"),
            Err(ManifestError::Url { .. })
        ));
    }

    #[test]
    fn test_unique_rendition_ids() {
        let mut e = Enumeration::new(ManifestFormat::SegmentedPlaylist, "http://h/m.m3u8");
        let id = e.unique_id(RenditionId::new("800000"));
        e.renditions.push(Rendition::new(
            id,
            TrackKind::Video,
            ContainerFormat::TransportStream,
        ));
        assert_eq!(e.unique_id(RenditionId::new("800000")).as_str(), "800000-2");
    }

    #[test]
    fn test_side_resources_deduplicated() {
        let mut e = Enumeration::new(ManifestFormat::SegmentedPlaylist, "http://h/m.m3u8");
        e.add_side_resource(SideResourceKind::Key, "http://h/k.key");
        e.add_side_resource(SideResourceKind::Key, "http://h/k.key");
        assert_eq!(e.side_resources_of(SideResourceKind::Key).count(), 1);
    }

    #[test]
    fn test_manifest_from_response() {
        let resp = FetchResponse::new("http://h/m.mpd", 200, "<MPD/>")
            .with_header("content-type", "application/dash+xml");
        let manifest = Manifest::from_response(&resp).unwrap();
        assert_eq!(manifest.format, ManifestFormat::TemplateManifest);

        let resp = FetchResponse::new("http://h/x", 200, "").with_header("content-type", "text/html");
        assert!(matches!(
            Manifest::from_response(&resp),
            Err(ManifestError::UnsupportedContentType(_))
        ));
    }
}
