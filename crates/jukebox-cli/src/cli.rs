//! Command-line interface definitions.
//!
//! This module contains the `clap`-powered CLI surface area (args + defaults).

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "jukebox-cli", version = crate::VERSION)]
pub struct Args {
    /// Optional player config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Command script to run instead of reading stdin
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Display name used as the requester of queued tracks
    #[arg(long, default_value = "console")]
    pub requester: String,

    /// Override the local voice playback speed (e.g. 10 plays ten times faster)
    #[arg(long)]
    pub speed: Option<f64>,

    /// Print structured status records as JSON instead of plain lines
    #[arg(long)]
    pub json: bool,
}
