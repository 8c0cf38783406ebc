//! Bootstrap-indexed manifest (F4M) enumeration.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, info};
use vodcheck_common::{ContainerFormat, RenditionId, TrackKind};
use vodcheck_media::BootstrapTable;

use crate::error::{ManifestError, Result};
use crate::fetch::FetchContext;
use crate::model::{resolve_url, Enumeration, Fragment, Manifest, Rendition, SideResourceKind};
use crate::xml::{parse_document, Element};

/// Where a bootstrap table comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BootstrapSource {
    Inline(String),
    Remote(String),
}

fn bootstrap_source(info: &Element, base: &str) -> Result<BootstrapSource> {
    match info.attr("url") {
        Some(url) => Ok(BootstrapSource::Remote(resolve_url(base, url)?)),
        None => Ok(BootstrapSource::Inline(
            info.text.split_whitespace().collect(),
        )),
    }
}

/// Fragment URL for fragment `n` of a media entry: the media URL without its
/// query, then `Seg1-Frag<n>`.
pub fn fragment_url(base: &str, media_url: &str, fragment: u32) -> Result<String> {
    let stem = media_url.split('?').next().unwrap_or(media_url);
    resolve_url(base, &format!("{}Seg1-Frag{}", stem, fragment))
}

async fn load_bootstrap(
    ctx: &FetchContext<'_>,
    source: &BootstrapSource,
) -> std::result::Result<BootstrapTable, String> {
    let blob = match source {
        BootstrapSource::Inline(text) => STANDARD
            .decode(text)
            .map_err(|e| format!("bootstrap is not valid base64: {}", e))?,
        BootstrapSource::Remote(url) => ctx
            .get(url)
            .await
            .map_err(|e| e.to_string())?
            .body
            .to_vec(),
    };
    BootstrapTable::decode(&blob).map_err(|e| format!("bootstrap decode failed: {}", e))
}

/// Enumerate an F4M manifest, decoding each referenced bootstrap once.
pub async fn enumerate(ctx: &FetchContext<'_>, manifest: &Manifest) -> Result<Enumeration> {
    let root = parse_document(&manifest.url, &manifest.body)?;
    if root.name != "manifest" {
        return Err(ManifestError::parse(&manifest.url, "root element is not manifest"));
    }
    let base = match root.child("baseURL").map(Element::trimmed_text) {
        Some(base) if !base.is_empty() => resolve_url(&manifest.url, base)?,
        _ => manifest.url.clone(),
    };

    let infos: Vec<&Element> = root.children_named("bootstrapInfo").collect();
    let mut tables: HashMap<String, std::result::Result<BootstrapTable, String>> = HashMap::new();
    let mut enumeration = Enumeration::new(manifest.format, &manifest.url);

    for (ordinal, media) in root.children_named("media").enumerate() {
        let Some(media_url) = media.attr("url") else {
            enumeration.skip(&manifest.url, "media entry without url");
            continue;
        };
        let info = match media.attr("bootstrapInfoId") {
            Some(id) => infos.iter().find(|i| i.attr("id") == Some(id)),
            None => infos.first(),
        };
        let Some(info) = info else {
            enumeration.skip(media_url, "no matching bootstrapInfo");
            continue;
        };

        let source = bootstrap_source(info, &base)?;
        let key = match &source {
            BootstrapSource::Inline(text) => text.clone(),
            BootstrapSource::Remote(url) => {
                enumeration.add_side_resource(SideResourceKind::Bootstrap, url.clone());
                url.clone()
            }
        };
        if !tables.contains_key(&key) {
            let loaded = load_bootstrap(ctx, &source).await;
            tables.insert(key.clone(), loaded);
        }
        let table = match tables.get(&key) {
            Some(Ok(table)) => table,
            Some(Err(reason)) => {
                enumeration.skip(media_url, reason);
                continue;
            }
            None => continue,
        };
        debug!(
            media = media_url,
            entries = table.entries().len(),
            warnings = table.warnings.len(),
            "bootstrap decoded"
        );

        let bitrate = media.attr("bitrate").and_then(|b| b.trim().parse::<u64>().ok());
        let preferred = bitrate
            .map(RenditionId::from_bandwidth)
            .unwrap_or_else(|| RenditionId::from_ordinal(ordinal + 1));
        let mut rendition = Rendition::new(
            enumeration.unique_id(preferred),
            TrackKind::Video,
            ContainerFormat::MuxPackets,
        );
        rendition.bandwidth = bitrate.map(|b| b * 1000);
        let timescale = table.timescale.max(1) as f64;
        for entry in table.entries() {
            let url = fragment_url(&base, media_url, entry.fragment)?;
            rendition
                .fragments
                .push(Fragment::new(url, entry.fragment).with_duration(entry.duration as f64 / timescale));
        }
        enumeration.renditions.push(rendition);
    }

    info!(
        renditions = enumeration.renditions.len(),
        fragments = enumeration.fragment_count(),
        skipped = enumeration.skipped.len(),
        "f4m enumerated"
    );
    Ok(enumeration)
}
