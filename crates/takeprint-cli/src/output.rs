//! JSON output formatting

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use takeprint_cache::DirectoryFingerprintCache;
use takeprint_core::{Algorithm, BatchObserver, BatchReport, MatchResult};

/// Result of an `fpmatch` run
#[derive(Debug, Serialize)]
pub struct MatchOutput<'a> {
    pub algorithm: Algorithm,
    pub threshold: f32,
    pub files: usize,
    pub fingerprinted: usize,
    pub matches: &'a [MatchResult],
    pub warnings: &'a [String],
}

impl<'a> MatchOutput<'a> {
    pub fn new(algorithm: Algorithm, threshold: f32, report: &'a BatchReport, matches: &'a [MatchResult]) -> Self {
        Self {
            algorithm,
            threshold,
            files: report.statuses.len(),
            fingerprinted: report.count(|s| s.has_fingerprints()),
            matches,
            warnings: &report.warnings,
        }
    }
}

/// Flag state of one directory, as printed by `fpflags`
#[derive(Debug, Serialize)]
pub struct FlagsOutput {
    pub directory: PathBuf,
    pub is_reference_folder: bool,
    pub ignore_fingerprints: bool,
    pub excluded_files: Vec<String>,
    pub cached_files: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pruned: Option<usize>,
}

impl FlagsOutput {
    pub fn new(directory: &Path, cache: &DirectoryFingerprintCache, pruned: Option<usize>) -> Self {
        Self {
            directory: directory.to_path_buf(),
            is_reference_folder: cache.is_reference_folder,
            ignore_fingerprints: cache.is_ignored,
            excluded_files: cache.excluded_files.iter().cloned().collect(),
            cached_files: cache.files.len(),
            pruned,
        }
    }
}

/// Pretty-print any result to stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Progress line on stderr, errors and warnings through the logger
#[derive(Debug, Default)]
pub struct StderrProgress;

impl BatchObserver for StderrProgress {
    fn on_progress(&self, processed: usize, total: usize) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r{}/{} files", processed, total);
        if processed == total {
            let _ = writeln!(stderr);
        }
    }

    fn on_file_error(&self, file: &Path, message: &str) {
        log::warn!("{}: {}", file.display(), message);
    }

    fn on_warning(&self, message: &str) {
        log::warn!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use takeprint_core::FileStatus;

    #[test]
    fn test_match_output_counts_fingerprinted_files() {
        let mut report = BatchReport::default();
        report.statuses.insert(PathBuf::from("/a.wav"), FileStatus::Cached);
        report.statuses.insert(PathBuf::from("/b.wav"), FileStatus::Computed);
        report
            .statuses
            .insert(PathBuf::from("/c.wav"), FileStatus::Error("decode".into()));

        let output = MatchOutput::new(Algorithm::Chroma, 0.8, &report, &[]);
        assert_eq!(output.files, 3);
        assert_eq!(output.fingerprinted, 2);

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["algorithm"], "chroma");
        assert!(json["matches"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_flags_output_uses_document_names() {
        let mut cache = DirectoryFingerprintCache::new();
        cache.toggle_ignore_fingerprints();
        cache.exclude_file("noise.wav");

        let json = serde_json::to_value(FlagsOutput::new(Path::new("/takes"), &cache, None)).unwrap();
        assert_eq!(json["ignore_fingerprints"], true);
        assert_eq!(json["is_reference_folder"], false);
        assert_eq!(json["excluded_files"][0], "noise.wav");
        assert!(json.get("pruned").is_none());
    }
}
