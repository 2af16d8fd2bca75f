//! Engine tests against real WAV files in scratch directories

use super::*;
use crate::audio::{AudioData, FileDecoder};
use std::f32::consts::PI;
use std::fs;
use std::sync::atomic::AtomicUsize;
use takeprint_cache::{cache_path, store};
use tempfile::TempDir;

const SAMPLE_RATE: u32 = 22050;

fn write_tone(path: &Path, freq: f32, secs: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let len = (SAMPLE_RATE as f32 * secs) as usize;
    for i in 0..len {
        let s = (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin() * 0.5;
        writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn tone_file(dir: &TempDir, name: &str, freq: f32) -> PathBuf {
    let path = dir.path().join(name);
    write_tone(&path, freq, 1.0);
    path
}

fn config(workers: usize) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.engine.workers = workers;
    config
}

fn engine(workers: usize) -> FingerprintEngine {
    FingerprintEngine::new(&config(workers), Arc::new(FileDecoder)).unwrap()
}

#[derive(Default)]
struct CountingDecoder {
    calls: AtomicUsize,
}

impl AudioDecoder for CountingDecoder {
    fn decode(&self, path: &Path) -> Result<AudioData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        FileDecoder.decode(path)
    }
}

/// Cancels its batch once `after` files have been processed
struct CancelAfter {
    flag: Arc<AtomicBool>,
    after: usize,
}

impl BatchObserver for CancelAfter {
    fn on_progress(&self, processed: usize, _total: usize) {
        if processed >= self.after {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

fn canonical_name(path: &Path) -> PathBuf {
    path.canonicalize().unwrap()
}

#[test]
fn test_signature_change_forces_recompute() {
    let dir = tempfile::tempdir().unwrap();
    let take = tone_file(&dir, "take.wav", 440.0);
    let decoder = Arc::new(CountingDecoder::default());
    let engine = FingerprintEngine::new(&config(2), decoder.clone()).unwrap();

    let first = engine.ensure_fingerprints(&[take.clone()], &NoopObserver);
    assert_eq!(first.status_of(&take), Some(&FileStatus::Computed));

    let second = engine.ensure_fingerprints(&[take.clone()], &NoopObserver);
    assert_eq!(second.status_of(&take), Some(&FileStatus::Cached));
    assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);

    // Re-record: longer file, so the size changes
    write_tone(&take, 440.0, 1.5);
    let third = engine.ensure_fingerprints(&[take.clone()], &NoopObserver);
    assert_eq!(third.status_of(&take), Some(&FileStatus::Computed));
    assert_eq!(decoder.calls.load(Ordering::SeqCst), 2);

    let on_disk = store::load(dir.path());
    let entry = on_disk.get_entry("take.wav").unwrap();
    assert_eq!(entry.signature, FileSignature::from_path(&take).unwrap());
    for name in Algorithm::all_names() {
        assert!(entry.fingerprint(name).is_some(), "missing {}", name);
    }
}

#[test]
fn test_entry_missing_an_algorithm_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let take = tone_file(&dir, "take.wav", 440.0);
    let engine = engine(1);
    engine.ensure_fingerprints(&[take.clone()], &NoopObserver);

    engine
        .cache_manager()
        .update(dir.path(), |cache| {
            let mut entry = cache.get_entry("take.wav").unwrap().clone();
            entry.fingerprints.remove("landmark");
            cache.set_entry("take.wav", entry);
        })
        .unwrap();

    let report = engine.ensure_fingerprints(&[take.clone()], &NoopObserver);
    assert_eq!(report.status_of(&take), Some(&FileStatus::Computed));
    assert!(engine.fingerprint_of(&take, Algorithm::Landmark).is_some());
}

#[test]
fn test_independent_tones_do_not_match() {
    let dir = tempfile::tempdir().unwrap();
    let a = tone_file(&dir, "a.wav", 440.0);
    let b = tone_file(&dir, "b.wav", 1000.0);
    let engine = engine(2);

    let report = engine.ensure_fingerprints(&[a.clone(), b.clone()], &NoopObserver);
    assert_eq!(report.computed(), 2);
    assert!(report.is_complete());

    let matches = engine.find_matches(&[a.clone(), b.clone()], Algorithm::Spectral, 0.99);
    assert!(matches.is_empty());
}

#[test]
fn test_file_is_never_matched_with_itself() {
    let dir = tempfile::tempdir().unwrap();
    let a = tone_file(&dir, "a.wav", 440.0);
    let decoder = Arc::new(CountingDecoder::default());
    let engine = FingerprintEngine::new(&config(2), decoder.clone()).unwrap();

    let report = engine.ensure_fingerprints(&[a.clone(), a.clone()], &NoopObserver);
    assert_eq!(report.statuses.len(), 1);
    assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);

    // Even a zero threshold yields nothing for a single distinct file
    let dotted = dir.path().join(".").join("a.wav");
    assert!(engine.find_matches(&[a.clone(), a.clone()], Algorithm::Spectral, 0.0).is_empty());
    assert!(engine.find_matches(&[a, dotted], Algorithm::Chroma, 0.0).is_empty());
}

#[test]
fn test_duplicate_content_matches() {
    let dir = tempfile::tempdir().unwrap();
    let a = tone_file(&dir, "a.wav", 440.0);
    let b = tone_file(&dir, "b.wav", 1000.0);
    let copy = dir.path().join("a_copy.wav");
    fs::copy(&a, &copy).unwrap();

    let engine = engine(2);
    let files = vec![a.clone(), b, copy.clone()];
    engine.ensure_fingerprints(&files, &NoopObserver);

    let matches = engine.find_matches(&files, Algorithm::Spectral, 0.99);
    assert_eq!(matches.len(), 1);
    let m = &matches[0];
    assert!(m.similarity >= 0.99);
    assert_eq!(m.algorithm, Algorithm::Spectral);
    let pair = [m.file_a.clone(), m.file_b.clone()];
    assert!(pair.contains(&canonical_name(&a)));
    assert!(pair.contains(&canonical_name(&copy)));
    assert!(!m.a_is_reference && !m.b_is_reference);
}

#[test]
fn test_matches_are_sorted_and_flag_reference_side() {
    let library = tempfile::tempdir().unwrap();
    let reference = tempfile::tempdir().unwrap();
    let a = tone_file(&library, "a.wav", 440.0);
    let a2 = library.path().join("a2.wav");
    fs::copy(&a, &a2).unwrap();
    let master = reference.path().join("master.wav");
    fs::copy(&a, &master).unwrap();

    let engine = engine(2);
    engine.cache_manager().toggle_reference_folder(reference.path()).unwrap();
    assert!(engine.is_reference_folder(reference.path()));

    let files = vec![a, a2, master.clone()];
    engine.ensure_fingerprints(&files, &NoopObserver);
    let matches = engine.find_matches(&files, Algorithm::Lightweight, 0.5);
    assert_eq!(matches.len(), 3);
    assert!(matches.windows(2).all(|w| w[0].similarity >= w[1].similarity));

    let master = canonical_name(&master);
    for m in &matches {
        assert_eq!(m.a_is_reference, m.file_a == master);
        assert_eq!(m.b_is_reference, m.file_b == master);
    }
}

#[test]
fn test_ignored_directory_is_excluded() {
    let dir = tempfile::tempdir().unwrap();
    let a = tone_file(&dir, "a.wav", 440.0);
    let b = tone_file(&dir, "b.wav", 440.0);
    let engine = engine(2);
    assert!(engine.cache_manager().toggle_ignore_fingerprints(dir.path()).unwrap());

    let report = engine.ensure_fingerprints(&[a.clone(), b.clone()], &NoopObserver);
    assert_eq!(report.excluded(), 2);
    assert_eq!(report.errors(), 0);
    assert!(store::load(dir.path()).files.is_empty());
    assert!(engine.find_matches(&[a, b], Algorithm::Spectral, 0.0).is_empty());
}

#[test]
fn test_excluded_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let a = tone_file(&dir, "a.wav", 440.0);
    let b = tone_file(&dir, "b.wav", 440.0);
    let engine = engine(2);

    engine.ensure_fingerprints(&[a.clone(), b.clone()], &NoopObserver);
    assert_eq!(engine.find_matches(&[a.clone(), b.clone()], Algorithm::Spectral, 0.9).len(), 1);

    engine.cache_manager().exclude_file(dir.path(), "b.wav").unwrap();
    let report = engine.ensure_fingerprints(&[a.clone(), b.clone()], &NoopObserver);
    assert_eq!(report.status_of(&a), Some(&FileStatus::Cached));
    assert_eq!(report.status_of(&b), Some(&FileStatus::Excluded));
    assert!(engine.find_matches(&[a, b], Algorithm::Spectral, 0.9).is_empty());
}

#[test]
fn test_decode_failure_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let good = tone_file(&dir, "good.wav", 440.0);
    let broken = dir.path().join("broken.wav");
    fs::write(&broken, b"this is not a wav file").unwrap();
    let missing = dir.path().join("missing.wav");

    let engine = engine(2);
    let (observer, events) = ChannelObserver::new();
    let report = engine.ensure_fingerprints(&[good.clone(), broken.clone(), missing.clone()], &observer);

    assert_eq!(report.status_of(&good), Some(&FileStatus::Computed));
    assert!(report.status_of(&broken).unwrap().is_error());
    assert!(report.status_of(&missing).unwrap().is_error());
    assert!(report.is_complete());

    let errors: Vec<PathBuf> = events
        .try_iter()
        .filter_map(|event| match event {
            EngineEvent::FileError { file, .. } => Some(file),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 2);
    assert!(errors.contains(&canonical_name(&broken)));

    let on_disk = store::load(dir.path());
    assert!(on_disk.get_entry("good.wav").is_some());
    assert!(on_disk.get_entry("broken.wav").is_none());
}

#[test]
fn test_corrupt_cache_is_reported_and_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let a = tone_file(&dir, "a.wav", 440.0);
    fs::write(cache_path(dir.path()), "{ not json").unwrap();

    let engine = engine(1);
    let (observer, events) = ChannelObserver::new();
    let report = engine.ensure_fingerprints(&[a.clone()], &observer);

    assert_eq!(report.status_of(&a), Some(&FileStatus::Computed));
    assert_eq!(report.warnings.len(), 1);
    assert!(events
        .try_iter()
        .any(|event| matches!(event, EngineEvent::Warning(_))));

    let rewritten = store::try_load(dir.path()).unwrap().unwrap();
    assert!(rewritten.get_entry("a.wav").is_some());
}

#[test]
fn test_unwritable_cache_warns_and_keeps_results() {
    let dir = tempfile::tempdir().unwrap();
    let a = tone_file(&dir, "a.wav", 440.0);
    let copy = dir.path().join("a_copy.wav");
    fs::copy(&a, &copy).unwrap();
    // A directory in the document's place makes every save fail
    fs::create_dir(cache_path(dir.path())).unwrap();

    let engine = engine(2);
    let files = vec![a.clone(), copy.clone()];
    let (observer, events) = ChannelObserver::new();
    let report = engine.ensure_fingerprints(&files, &observer);

    assert!(!report.warnings.is_empty());
    assert_eq!(report.status_of(&a), Some(&FileStatus::Computed));
    assert_eq!(report.status_of(&copy), Some(&FileStatus::Computed));
    assert_eq!(report.errors(), 0);
    assert!(events
        .try_iter()
        .any(|event| matches!(event, EngineEvent::Warning(_))));

    let matches = engine.find_matches(&files, Algorithm::Spectral, 0.99);
    assert_eq!(matches.len(), 1);

    let again = engine.ensure_fingerprints(&files, &NoopObserver);
    assert_eq!(again.cached(), 2);
}

#[test]
fn test_cancel_keeps_completed_work() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<PathBuf> = (0..5)
        .map(|i| tone_file(&dir, &format!("take{}.wav", i), 220.0 + 110.0 * i as f32))
        .collect();

    // One worker so files run strictly one after another
    let engine = engine(1);
    let flag = Arc::new(AtomicBool::new(false));
    let observer = CancelAfter {
        flag: Arc::clone(&flag),
        after: 2,
    };
    let report = engine.ensure_fingerprints_cancellable(&files, &observer, &flag);

    assert!(report.cancelled);
    assert!(!report.is_complete());
    assert_eq!(report.computed(), 2);
    assert_eq!(report.cancelled_files(), 3);
    assert_eq!(report.errors(), 0);
    assert_eq!(store::load(dir.path()).files.len(), 2);
}


#[test]
fn test_cancel_after_last_file_leaves_batch_complete() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<PathBuf> = (0..3)
        .map(|i| tone_file(&dir, &format!("take{}.wav", i), 220.0 + 110.0 * i as f32))
        .collect();

    let engine = engine(1);
    let flag = Arc::new(AtomicBool::new(false));
    let observer = CancelAfter {
        flag: Arc::clone(&flag),
        after: 3,
    };
    let report = engine.ensure_fingerprints_cancellable(&files, &observer, &flag);

    assert!(flag.load(Ordering::SeqCst));
    assert_eq!(report.computed(), 3);
    assert_eq!(report.cancelled_files(), 0);
    assert!(!report.cancelled);
    assert!(report.is_complete());
}

#[test]
fn test_parallel_writes_to_one_directory_are_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<PathBuf> = (0..8)
        .map(|i| tone_file(&dir, &format!("take{}.wav", i), 200.0 + 50.0 * i as f32))
        .collect();

    let engine = engine(4);
    let report = engine.ensure_fingerprints(&files, &NoopObserver);
    assert_eq!(report.computed(), 8);
    assert_eq!(store::load(dir.path()).files.len(), 8);
}

#[test]
fn test_spawn_ensure_reports_through_channel() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<PathBuf> = (0..3)
        .map(|i| tone_file(&dir, &format!("take{}.wav", i), 330.0 * (i + 1) as f32))
        .collect();

    let engine = engine(2);
    let (observer, events) = ChannelObserver::new();
    let handle = engine.spawn_ensure(files, Arc::new(observer)).unwrap();
    let report = handle.wait().unwrap();
    assert_eq!(report.computed(), 3);

    let events: Vec<EngineEvent> = events.try_iter().collect();
    let progress = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::Progress { .. }))
        .count();
    assert_eq!(progress, 3);
    match events.last() {
        Some(EngineEvent::BatchFinished(finished)) => assert_eq!(finished.computed(), 3),
        other => panic!("expected BatchFinished last, got {:?}", other),
    }
}

#[test]
fn test_spawn_find_matches_delivers_results() {
    let dir = tempfile::tempdir().unwrap();
    let a = tone_file(&dir, "a.wav", 440.0);
    let copy = dir.path().join("copy.wav");
    fs::copy(&a, &copy).unwrap();

    let engine = engine(2);
    engine.ensure_fingerprints(&[a.clone(), copy.clone()], &NoopObserver);

    let (observer, events) = ChannelObserver::new();
    let handle = engine
        .spawn_find_matches(vec![a, copy], Algorithm::Chroma, 0.95, Arc::new(observer))
        .unwrap();
    let results = handle.wait().unwrap();
    assert_eq!(results.len(), 1);
    assert!(events
        .try_iter()
        .any(|e| matches!(e, EngineEvent::MatchResults(r) if r.len() == 1)));
}

#[test]
fn test_drop_waits_for_background_batch() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<PathBuf> = (0..4)
        .map(|i| tone_file(&dir, &format!("take{}.wav", i), 300.0 + 100.0 * i as f32))
        .collect();

    let engine = engine(1);
    let handle = engine.spawn_ensure(files, Arc::new(NoopObserver)).unwrap();
    drop(engine);

    // The task has already been joined; its report is waiting
    assert!(handle.is_finished());
    let report = handle.wait().unwrap();
    assert_eq!(report.statuses.len(), 4);
    assert_eq!(report.computed() + report.cancelled_files(), 4);
    assert_eq!(store::load(dir.path()).files.len(), report.computed());
}

#[test]
fn test_shutdown_leaves_no_active_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let a = tone_file(&dir, "a.wav", 440.0);
    let engine = engine(2);

    let handle = engine.spawn_ensure(vec![a], Arc::new(NoopObserver)).unwrap();
    engine.shutdown();
    assert_eq!(engine.active_tasks(), 0);
    assert!(handle.wait().is_ok());
}

#[test]
fn test_fingerprint_of_tracks_validity() {
    let dir = tempfile::tempdir().unwrap();
    let a = tone_file(&dir, "a.wav", 440.0);
    let engine = engine(1);
    assert!(engine.fingerprint_of(&a, Algorithm::Spectral).is_none());

    engine.ensure_fingerprints(&[a.clone()], &NoopObserver);
    let vector = engine.fingerprint_of(&a, Algorithm::Spectral).unwrap();
    assert_eq!(vector.len(), 32);
    assert_eq!(engine.fingerprint_of(&a, Algorithm::Chroma).unwrap().len(), 12);

    write_tone(&a, 440.0, 2.0);
    assert!(engine.fingerprint_of(&a, Algorithm::Spectral).is_none());
}

#[test]
fn test_report_serializes_statuses() {
    let mut report = BatchReport::default();
    report
        .statuses
        .insert(PathBuf::from("/music/a.wav"), FileStatus::Error("bad header".into()));
    report.statuses.insert(PathBuf::from("/music/b.wav"), FileStatus::Cached);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["statuses"]["/music/a.wav"]["status"], "error");
    assert_eq!(json["statuses"]["/music/a.wav"]["message"], "bad header");
    assert_eq!(json["statuses"]["/music/b.wav"]["status"], "cached");
}
