//! Validators run over a completed fragment pass.

mod consistency;
mod keyframes;

pub use consistency::{check_cross_stream, check_in_stream, Observation};
pub use keyframes::KeyframeChecker;
