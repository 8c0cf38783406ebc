//! Vodcheck - Protocol and media timing verifier for adaptive-bitrate packagers
//!
//! This library crate exposes the run pipeline and its parts for the binary
//! and for integration testing.

pub mod check;
pub mod config;
pub mod fetch;
pub mod pipeline;
pub mod report;

pub use pipeline::Verifier;
pub use report::Report;
