//! Shared plumbing for the takeprint command-line tools

pub mod output;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use takeprint_core::audio::is_supported_audio;
use takeprint_core::EngineConfig;

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "takeprint.toml";

/// Default: no logs (clean JSON on stdout). Verbose: info level on stderr.
pub fn init_logger(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

/// Explicit config file, else `takeprint.toml` if present, else defaults
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path),
        None => {
            let local = Path::new(DEFAULT_CONFIG_FILE);
            if local.is_file() {
                log::info!("Using {}", local.display());
                EngineConfig::from_file(local)
            } else {
                Ok(EngineConfig::default())
            }
        }
    }
}

/// Expand directories into the audio files they contain. Files named
/// explicitly are kept whatever their extension.
pub fn expand_paths(paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            collect_audio(path, recursive, &mut files)?;
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn collect_audio(dir: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            if recursive {
                collect_audio(&path, recursive, files)?;
            }
        } else if is_supported_audio(&path) {
            files.push(path);
        }
    }
    Ok(())
}
