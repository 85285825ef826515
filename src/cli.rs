//! Command-line interface definitions for the prefetch pipeline.
//!
//! Every option can also be provided through an environment variable so the
//! binary can be driven by a scheduler without argument plumbing.

use clap::Parser;

/// Command-line arguments for the prefetch pipeline.
///
/// Without `--full` a single rotation slot runs, chosen from the wall clock.
///
/// # Examples
///
/// ```sh
/// # Run the slot for the current 10-minute window
/// news_prefetch
///
/// # Refresh every category, videos, blog and custom sections (deploy time)
/// news_prefetch --full -d ./public/data
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Run every slot in sequence instead of the rotation slot
    #[arg(short, long, env = "PREFETCH_FULL")]
    pub full: bool,

    /// Directory holding the persisted JSON documents
    #[arg(short, long, env = "PREFETCH_DATA_DIR", default_value = "public/data")]
    pub data_dir: String,

    /// Optional path to a YAML config file
    #[arg(short, long, env = "PREFETCH_CONFIG")]
    pub config: Option<String>,
}
