//! Vodcheck-Common: Shared data model for the vodcheck verifier.
//!
//! This crate provides the types that flow between the manifest enumerators,
//! the binary container parsers and the validators:
//!
//! - **Identifiers**: [`RenditionId`] naming one quality variant of an asset
//! - **Formats**: [`ManifestFormat`] (delivery style) and [`ContainerFormat`]
//!   (fragment container), with the native timescale of each format
//! - **Timing**: [`TimingInfo`] recovered from a fragment's bitstream
//! - **Issues**: [`ValidationIssue`] records accumulated over a run
//!
//! # Examples
//!
//! ```
//! use vodcheck_common::{ManifestFormat, TimingInfo};
//!
//! let format = ManifestFormat::from_content_type("application/vnd.apple.mpegurl").unwrap();
//! assert_eq!(format.timescale(), 90_000);
//!
//! let timing = TimingInfo::new(0, 0, 900_000, 900_000);
//! assert!(timing.is_well_formed());
//! ```

pub mod error;
pub mod ids;
pub mod issue;
pub mod types;

pub use error::{Error, Result};
pub use ids::RenditionId;
pub use issue::{Clock, IssueKind, ValidationIssue};
pub use types::*;
