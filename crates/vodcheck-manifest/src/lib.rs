//! # vodcheck-manifest
//!
//! Manifest enumeration for the vodcheck verifier.
//!
//! Given a manifest URL, the enumerators produce the full, ordered list of
//! fragment URLs per rendition, plus the side resources (keys, init
//! segments, bootstrap tables, keyframe playlists) the manifest references:
//!
//! - [`hls`]: segmented playlists (master and media)
//! - [`dash`]: template manifests (periods, segment templates and timelines)
//! - [`hds`]: bootstrap-indexed manifests
//! - [`mss`]: smooth-fragment manifests
//!
//! Network access goes through the [`Fetcher`] trait so enumeration can run
//! against canned responses in tests.
//!
//! ## Example
//!
//! ```
//! use vodcheck_manifest::{enumerate, FetchContext, StaticFetcher};
//!
//! # tokio_test::block_on(async {
//! let fetcher = StaticFetcher::new().with(
//!     "http://cdn/v/index.m3u8",
//!     "application/vnd.apple.mpegurl",
//!     "#EXTM3U\n#EXTINF:6,\na.ts\n#EXTINF:6,\nb.ts\n",
//! );
//! let ctx = FetchContext::new(&fetcher, Vec::new());
//! let (_, enumeration) = enumerate(&ctx, "http://cdn/v/index.m3u8").await.unwrap();
//! assert_eq!(enumeration.fragment_count(), 2);
//! # });
//! ```

pub mod dash;
mod enumerate;
pub mod error;
pub mod fetch;
pub mod hds;
pub mod hls;
pub mod model;
pub mod mss;
pub mod sampling;
mod xml;

pub use enumerate::{enumerate, enumerate_manifest};
pub use error::{FetchError, ManifestError, Result};
pub use fetch::{ByteRange, FetchContext, FetchRequest, FetchResponse, Fetcher, StaticFetcher};
pub use hls::{parse_iframe_playlist, DeclaredKeyframe, SegmentKeyframes};
pub use model::{
    resolve_url, Encryption, Enumeration, Fragment, Manifest, Rendition, SideResource,
    SideResourceKind, SkippedReference, MAX_FRAGMENTS_PER_RENDITION,
};
pub use sampling::sample_evenly;
