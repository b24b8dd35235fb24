// CLI module for genguard
// Author: kelexine (https://github.com/kelexine)

use clap::Parser;
use std::path::PathBuf;

/// genguard - rate limiting, response caching and retry in front of an AI provider
#[derive(Parser, Debug)]
#[command(name = "genguard", version, about, long_about = None)]
pub struct Args {
    /// Config file (default: ~/.genguard/config.toml)
    #[arg(short, long, env = "GENGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Remove expired cache entries and closed rate windows, then exit
    #[arg(long)]
    pub sweep_once: bool,
}
