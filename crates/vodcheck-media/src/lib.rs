//! # vodcheck-media
//!
//! Binary container parsing for the vodcheck verifier.
//!
//! This crate provides:
//! - Checked big-endian byte and bit readers
//! - An ISO-BMFF box tree with typed `sidx`/`tfdt`/`tfhd`/`trun`/`tfxd` readers
//! - A single-pass MPEG transport stream demultiplexer (PAT/PMT/PES, access
//!   units, continuity counters)
//! - The 11-byte-header mux packet parser used by bootstrap-indexed fragments
//! - The bootstrap (`abst`) run table decoder
//! - AES-128-CBC segment decryption
//! - Timing extraction producing [`TimingInfo`](vodcheck_common::TimingInfo)
//!   per elementary stream
//!
//! Everything here is synchronous and operates on in-memory buffers.
//!
//! ## Example
//!
//! ```
//! use vodcheck_media::crypto::segment_iv;
//!
//! let iv = segment_iv(1);
//! assert_eq!(iv[15], 1);
//! ```

pub mod bitstream;
pub mod bootstrap;
pub mod crypto;
mod error;
pub mod mp4;
pub mod mux;
pub mod timing;
pub mod ts;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use bootstrap::{BootstrapEntry, BootstrapTable, BootstrapWarning};
pub use crypto::{decrypt_segment, segment_iv};
pub use error::{DecryptError, Error, Result};
pub use timing::{extract_timing, timing_from_summary, TrackTiming};
