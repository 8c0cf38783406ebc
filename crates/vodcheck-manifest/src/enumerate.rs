//! Format dispatch.

use tracing::debug;
use vodcheck_common::ManifestFormat;

use crate::error::Result;
use crate::fetch::FetchContext;
use crate::model::{Enumeration, Manifest};
use crate::{dash, hds, hls, mss};

/// Enumerate an already fetched manifest with the enumerator for its format.
pub async fn enumerate_manifest(ctx: &FetchContext<'_>, manifest: &Manifest) -> Result<Enumeration> {
    debug!(url = %manifest.url, format = %manifest.format, "enumerating");
    match manifest.format {
        ManifestFormat::SegmentedPlaylist => hls::enumerate(ctx, manifest).await,
        ManifestFormat::TemplateManifest => dash::enumerate(manifest),
        ManifestFormat::BootstrapIndexed => hds::enumerate(ctx, manifest).await,
        ManifestFormat::SmoothFragment => mss::enumerate(manifest),
    }
}

/// Fetch `url`, select the format from its content type and enumerate it.
pub async fn enumerate(ctx: &FetchContext<'_>, url: &str) -> Result<(Manifest, Enumeration)> {
    let response = ctx.get(url).await?;
    let manifest = Manifest::from_response(&response)?;
    let enumeration = enumerate_manifest(ctx, &manifest).await?;
    Ok((manifest, enumeration))
}
