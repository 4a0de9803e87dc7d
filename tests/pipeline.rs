//! Integration tests for the lookahead `SynthesisPipeline`.
//!
//! A mock engine writes short silent WAV files and reports one timed segment
//! per word, optionally after a delay. No speech binaries, models or network
//! access are needed.
//!
//! # What is tested
//!
//! - Units arrive in sentence order with valid timelines
//! - A failing unit is reported and the run continues
//! - At most `lookahead_depth` units are rendered ahead of the consumer
//! - Seeking discards in-flight units and removes their audio files
//! - Delivered units drive a `PlaybackSynchronizer` to completion

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tts_wordsync::{
    pipeline::SynthesisPipeline, AudioClip, AudioFormat, EngineError, EngineOutput,
    PipelineError, PlaybackSynchronizer, RawTimingObservation, ReaderConfig, SpeechEngine,
    SyncEvent,
};

// ── Mock engine ────────────────────────────────────────────────────

const SAMPLE_RATE: u32 = 8_000;
const WORD_SECS: f64 = 0.1;

#[derive(Default)]
struct MockState {
    started: AtomicUsize,
    texts: Mutex<Vec<String>>,
    paths: Mutex<Vec<PathBuf>>,
}

struct MockEngine {
    state: Arc<MockState>,
    delay: Duration,
    overlap: Option<f64>,
}

impl MockEngine {
    fn new(delay: Duration) -> (Self, Arc<MockState>) {
        let state = Arc::new(MockState::default());
        (
            Self {
                state: Arc::clone(&state),
                delay,
                overlap: None,
            },
            state,
        )
    }
}

impl SpeechEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::Wav
    }

    fn initialize(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn synthesize(&mut self, text: &str, output_path: &Path) -> Result<EngineOutput, EngineError> {
        self.state.started.fetch_add(1, Ordering::SeqCst);
        self.state.texts.lock().unwrap().push(text.to_string());
        std::thread::sleep(self.delay);

        if text.contains("FAIL") {
            return Err(EngineError::SynthesisFailure("mock failure".to_string()));
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        write_silence(output_path, words.len() as f64 * WORD_SECS);
        self.state.paths.lock().unwrap().push(output_path.to_path_buf());

        let observations = words
            .iter()
            .enumerate()
            .map(|(i, w)| {
                RawTimingObservation::new(*w, i as f64 * WORD_SECS, (i + 1) as f64 * WORD_SECS)
            })
            .collect();
        Ok(EngineOutput {
            clip: AudioClip::new(output_path, AudioFormat::Wav),
            observations,
        })
    }

    fn overlap_seconds(&self) -> Option<f64> {
        self.overlap
    }
}

fn write_silence(path: &Path, secs: f64) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for _ in 0..(secs * SAMPLE_RATE as f64) as usize {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();
}

// ── Helpers ────────────────────────────────────────────────────────

fn config(dir: &Path, depth: usize) -> ReaderConfig {
    ReaderConfig {
        lookahead_depth: depth,
        audio_dir: Some(dir.to_path_buf()),
        ..Default::default()
    }
}

fn sentences(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("Sentence number {i} here.")).collect()
}

fn pipeline(dir: &Path, depth: usize, delay: Duration) -> (SynthesisPipeline, Arc<MockState>) {
    let (engine, state) = MockEngine::new(delay);
    let pipeline = SynthesisPipeline::new(Box::new(engine), &config(dir, depth)).unwrap();
    (pipeline, state)
}

// ── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn delivers_units_in_order_with_valid_timelines() {
    let dir = tempfile::tempdir().unwrap();
    let (mut pipeline, _state) = pipeline(dir.path(), 2, Duration::ZERO);
    pipeline.start(sentences(5), 0);

    let mut indices = Vec::new();
    while let Some(outcome) = pipeline.next().await {
        let unit = outcome.result.unwrap();
        unit.timeline.validate(unit.text.len()).unwrap();
        assert!((unit.total_duration() - 4.0 * WORD_SECS).abs() < 1e-9);
        indices.push(outcome.index);
    }
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn starts_from_requested_index() {
    let dir = tempfile::tempdir().unwrap();
    let (mut pipeline, _state) = pipeline(dir.path(), 3, Duration::ZERO);
    pipeline.start(sentences(5), 3);

    assert_eq!(pipeline.next().await.unwrap().index, 3);
    assert_eq!(pipeline.next().await.unwrap().index, 4);
    assert!(pipeline.next().await.is_none());
}

#[tokio::test]
async fn failed_unit_is_reported_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let (mut pipeline, _state) = pipeline(dir.path(), 2, Duration::ZERO);
    let texts = vec![
        "First one.".to_string(),
        "FAIL this one.".to_string(),
        "Third one.".to_string(),
    ];
    pipeline.start(texts, 0);

    let first = pipeline.next().await.unwrap();
    assert!(first.result.is_ok());

    let second = pipeline.next().await.unwrap();
    assert_eq!(second.index, 1);
    assert!(matches!(
        second.result,
        Err(PipelineError::Engine(EngineError::SynthesisFailure(_)))
    ));

    let third = pipeline.next().await.unwrap();
    assert_eq!(third.index, 2);
    assert!(third.result.is_ok());
    assert!(pipeline.next().await.is_none());
}

#[tokio::test]
async fn lookahead_is_bounded_by_depth() {
    let dir = tempfile::tempdir().unwrap();
    let (mut pipeline, state) = pipeline(dir.path(), 2, Duration::ZERO);
    pipeline.start(sentences(6), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(state.started.load(Ordering::SeqCst), 2);

    let held = pipeline.next().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(state.started.load(Ordering::SeqCst), 3);
    drop(held);
}

#[tokio::test]
async fn seek_discards_in_flight_units_and_their_clips() {
    let dir = tempfile::tempdir().unwrap();
    let (mut pipeline, state) = pipeline(dir.path(), 2, Duration::from_millis(200));
    let texts = sentences(6);
    pipeline.start(texts.clone(), 0);

    let first = pipeline.next().await.unwrap();
    assert_eq!(first.index, 0);
    drop(first);

    pipeline.seek(texts.clone(), 4);
    let jumped = pipeline.next().await.unwrap();
    assert_eq!(jumped.index, 4);
    let held = jumped.result.unwrap();
    assert!(held.clip.path().exists());

    let last = pipeline.next().await.unwrap();
    assert_eq!(last.index, 5);
    assert!(last.result.is_ok());
    assert!(pipeline.next().await.is_none());

    // Let anything still rendering from the first run finish.
    tokio::time::sleep(Duration::from_millis(800)).await;

    let paths = state.paths.lock().unwrap().clone();
    for path in paths.iter().filter(|p| path_name(p).starts_with("unit_1_")) {
        assert!(!path.exists(), "{} should have been removed", path.display());
    }
    assert!(held.clip.path().exists());

    // Sentence 3 never got a permit before the seek.
    let texts_seen = state.texts.lock().unwrap().clone();
    assert!(!texts_seen.contains(&texts[3]));
}

#[tokio::test]
async fn cancel_stops_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let (mut pipeline, _state) = pipeline(dir.path(), 2, Duration::from_millis(50));
    pipeline.start(sentences(4), 0);
    pipeline.cancel();
    assert!(pipeline.next().await.is_none());
}

#[test]
fn overlap_follows_engine_preference_unless_configured() {
    let dir = tempfile::tempdir().unwrap();

    let (mut engine, _state) = MockEngine::new(Duration::ZERO);
    engine.overlap = Some(0.25);
    let pipeline = SynthesisPipeline::new(Box::new(engine), &config(dir.path(), 2)).unwrap();
    assert_eq!(pipeline.overlap_seconds(), 0.25);

    let (engine, _state) = MockEngine::new(Duration::ZERO);
    let pipeline = SynthesisPipeline::new(Box::new(engine), &config(dir.path(), 2)).unwrap();
    assert_eq!(pipeline.overlap_seconds(), 0.5);

    let (mut engine, _state) = MockEngine::new(Duration::ZERO);
    engine.overlap = Some(0.25);
    let mut overridden = config(dir.path(), 2);
    overridden
        .engine_overlap_seconds
        .insert("mock".to_string(), 0.75);
    let pipeline = SynthesisPipeline::new(Box::new(engine), &overridden).unwrap();
    assert_eq!(pipeline.overlap_seconds(), 0.75);
}

#[tokio::test]
async fn delivered_unit_drives_synchronizer() {
    let dir = tempfile::tempdir().unwrap();
    let (mut pipeline, _state) = pipeline(dir.path(), 1, Duration::ZERO);
    pipeline.start(vec!["one two three four".to_string()], 0);

    let unit = pipeline.next().await.unwrap().result.unwrap();
    let mut sync = PlaybackSynchronizer::new(unit);
    let t0 = Instant::now();
    sync.start(t0);

    let mut highlighted = Vec::new();
    let mut step = 0;
    loop {
        let now = t0 + Duration::from_millis(step * 25);
        match sync.tick(now) {
            Some(SyncEvent::Highlight { word_index, .. }) => {
                if highlighted.last() != Some(&word_index) {
                    highlighted.push(word_index);
                }
            }
            Some(SyncEvent::Finished) => break,
            None => {}
        }
        step += 1;
    }
    assert_eq!(highlighted, vec![0, 1, 2, 3]);
}

fn path_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
