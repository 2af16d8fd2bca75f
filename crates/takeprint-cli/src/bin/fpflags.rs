//! fpflags - Inspect and edit a directory's fingerprint cache flags
//!
//! Usage: fpflags <dir> [--toggle-reference] [--toggle-ignore]
//!                      [--exclude NAME].. [--include NAME]..
//!                      [--rename OLD NEW] [--prune] [-v]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use takeprint_cli::init_logger;
use takeprint_cli::output::{print_json, FlagsOutput};
use takeprint_core::cache_manager::lock;
use takeprint_core::CacheManager;

#[derive(Parser, Debug)]
#[command(name = "fpflags")]
#[command(about = "Show or change per-directory fingerprint flags", long_about = None)]
struct Args {
    /// Directory holding the cache document
    directory: PathBuf,

    /// Flip the reference-folder flag
    #[arg(long)]
    toggle_reference: bool,

    /// Flip the ignore-fingerprints flag
    #[arg(long)]
    toggle_ignore: bool,

    /// Exclude a file from fingerprinting and matching
    #[arg(long, value_name = "NAME")]
    exclude: Vec<String>,

    /// Undo an exclusion
    #[arg(long, value_name = "NAME")]
    include: Vec<String>,

    /// Move cached fingerprints after renaming a file
    #[arg(long, num_args = 2, value_names = ["OLD", "NEW"])]
    rename: Option<Vec<String>>,

    /// Drop entries for files that no longer exist
    #[arg(long)]
    prune: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);

    let directory = args.directory.as_path();
    if !directory.is_dir() {
        anyhow::bail!("Not a directory: {}", directory.display());
    }

    let caches = CacheManager::new(1);

    if args.toggle_reference {
        let now = caches.toggle_reference_folder(directory)?;
        log::info!("Reference folder: {}", now);
    }
    if args.toggle_ignore {
        let now = caches.toggle_ignore_fingerprints(directory)?;
        log::info!("Ignore fingerprints: {}", now);
    }
    for name in &args.exclude {
        caches.exclude_file(directory, name)?;
    }
    for name in &args.include {
        caches.include_file(directory, name)?;
    }
    if let Some(names) = &args.rename {
        if let [old, new] = names.as_slice() {
            let moved = caches
                .rename_entry(directory, old, new)
                .with_context(|| format!("Failed to rename {} to {}", old, new))?;
            if !moved {
                log::warn!("No cache entry for {}", old);
            }
        }
    }
    let pruned = if args.prune {
        Some(caches.prune_missing(directory)?)
    } else {
        None
    };

    let handle = caches.open(directory);
    let dir_cache = lock(&handle);
    print_json(&FlagsOutput::new(directory, dir_cache.cache(), pruned))?;
    Ok(())
}
