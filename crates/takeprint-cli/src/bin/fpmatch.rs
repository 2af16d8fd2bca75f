//! fpmatch - Find near-duplicate takes
//!
//! Usage: fpmatch [--config <path>] [-a ALGORITHM] [-t THRESHOLD]
//!                [--workers N] [-r] [-v] <paths>...

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use takeprint_cli::output::{print_json, MatchOutput, StderrProgress};
use takeprint_cli::{expand_paths, init_logger, load_config};
use takeprint_core::{Algorithm, FileDecoder, FingerprintEngine};

#[derive(Parser, Debug)]
#[command(name = "fpmatch")]
#[command(about = "Fingerprint audio files and report similar pairs", long_about = None)]
struct Args {
    /// Audio files or directories
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// spectral, lightweight, chroma or landmark (overrides config)
    #[arg(short, long)]
    algorithm: Option<Algorithm>,

    /// Minimum similarity in [0, 1] (overrides config)
    #[arg(short, long)]
    threshold: Option<f32>,

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
    if let Some(algorithm) = args.algorithm {
        config.matching.algorithm = algorithm;
    }
    if let Some(threshold) = args.threshold {
        config.matching.threshold = threshold;
    }
    if let Some(workers) = args.workers {
        config.engine.workers = workers;
    }
    config.validate()?;

    let files = expand_paths(&args.paths, args.recursive)?;
    let engine = FingerprintEngine::new(&config, Arc::new(FileDecoder))?;

    let report = engine.ensure_fingerprints(&files, &StderrProgress);
    let matches = engine.find_matches(&files, config.matching.algorithm, config.matching.threshold);

    print_json(&MatchOutput::new(
        config.matching.algorithm,
        config.matching.threshold,
        &report,
        &matches,
    ))?;
    Ok(())
}
