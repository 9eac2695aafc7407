//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Download launcher assets with retry, resume, and live progress.
///
/// Each URL is saved into the output directory under the last segment of its
/// path. Transient network failures are retried with exponential backoff.
#[derive(Parser, Debug)]
#[command(name = "launcher-fetch")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Directory to save downloads into
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum concurrent downloads (1-32) [default: 3, or config file]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=32))]
    pub concurrency: Option<u8>,

    /// Maximum attempts per download, including the first (1-20) [default: 3, or config file]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(1..=20))]
    pub max_attempts: Option<u8>,

    /// Use the extended attempt budget for critical installer binaries
    #[arg(long, conflicts_with = "max_attempts")]
    pub critical: bool,

    /// Ignore the config file
    #[arg(long)]
    pub no_config: bool,
}
