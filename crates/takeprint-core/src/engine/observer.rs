//! Progress and result notifications
//!
//! Callbacks fire on worker or coordinator threads. Hosts with a UI thread
//! should use [`ChannelObserver`] and drain the receiver on their own loop.

use super::{BatchReport, MatchResult};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::path::{Path, PathBuf};

pub trait BatchObserver: Send + Sync {
    /// `processed` counts files that reached a final status other than
    /// cancelled
    fn on_progress(&self, _processed: usize, _total: usize) {}

    fn on_file_error(&self, _file: &Path, _message: &str) {}

    /// Non-fatal problems such as an unreadable or unwritable cache document
    fn on_warning(&self, _message: &str) {}

    fn on_finished(&self, _report: &BatchReport) {}

    fn on_match_results(&self, _results: &[MatchResult]) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    Progress { processed: usize, total: usize },
    FileError { file: PathBuf, message: String },
    Warning(String),
    BatchFinished(BatchReport),
    MatchResults(Vec<MatchResult>),
}

/// Forwards every notification as an [`EngineEvent`]
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: Sender<EngineEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, Receiver<EngineEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    fn send(&self, event: EngineEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

impl BatchObserver for ChannelObserver {
    fn on_progress(&self, processed: usize, total: usize) {
        self.send(EngineEvent::Progress { processed, total });
    }

    fn on_file_error(&self, file: &Path, message: &str) {
        self.send(EngineEvent::FileError {
            file: file.to_path_buf(),
            message: message.to_string(),
        });
    }

    fn on_warning(&self, message: &str) {
        self.send(EngineEvent::Warning(message.to_string()));
    }

    fn on_finished(&self, report: &BatchReport) {
        self.send(EngineEvent::BatchFinished(report.clone()));
    }

    fn on_match_results(&self, results: &[MatchResult]) {
        self.send(EngineEvent::MatchResults(results.to_vec()));
    }
}

/// Logs progress through the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl BatchObserver for LogObserver {
    fn on_progress(&self, processed: usize, total: usize) {
        if processed == total || processed % 50 == 0 {
            log::info!("Fingerprinted {}/{} files", processed, total);
        }
    }

    fn on_file_error(&self, file: &Path, message: &str) {
        log::warn!("Failed to fingerprint {}: {}", file.display(), message);
    }

    fn on_warning(&self, message: &str) {
        log::warn!("{}", message);
    }
}
