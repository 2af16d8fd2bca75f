//! fpscan - Compute and cache fingerprints
//!
//! Usage: fpscan [--config <path>] [--workers N] [-r] [-v] <paths>...

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use takeprint_cli::output::{print_json, StderrProgress};
use takeprint_cli::{expand_paths, init_logger, load_config};
use takeprint_core::{FileDecoder, FingerprintEngine};

#[derive(Parser, Debug)]
#[command(name = "fpscan")]
#[command(about = "Fingerprint audio files into their directory caches", long_about = None)]
struct Args {
    /// Audio files or directories
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worker threads (overrides config)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.engine.workers = workers;
    }

    let files = expand_paths(&args.paths, args.recursive)?;
    log::info!("Scanning {} files with {} workers", files.len(), config.engine.workers);

    let engine = FingerprintEngine::new(&config, Arc::new(FileDecoder))?;
    let report = engine.ensure_fingerprints(&files, &StderrProgress);

    print_json(&report)?;
    Ok(())
}
