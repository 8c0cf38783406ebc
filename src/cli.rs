use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vodcheck")]
#[command(author, version, about = "Verify timing consistency of adaptive-bitrate assets")]
pub struct Cli {
    /// Entry manifest URL (master playlist, MPD, F4M or Smooth manifest)
    #[arg(required = true)]
    pub url: String,

    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Output the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Number of fragments fetched in parallel
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Timing threshold in 90 kHz ticks
    #[arg(long)]
    pub threshold: Option<i64>,

    /// Check at most this many fragments per rendition (0 = all)
    #[arg(long)]
    pub max_fragments: Option<usize>,

    /// Per-fetch timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}
