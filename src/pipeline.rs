//! Lookahead synthesis.
//!
//! While one unit plays, the next few are rendered in the background so
//! playback never waits on the engine. Engine calls and duration probing
//! block and run on `tokio::task::spawn_blocking` workers; the engine itself
//! is shared behind a mutex and used by one worker at a time. Timing
//! calculation does no I/O and runs on the consumer side in
//! [`SynthesisPipeline::next`].
//!
//! At most `lookahead_depth` units are in flight or waiting to be consumed.
//! Each unit holds a semaphore permit from the moment its worker is spawned
//! until the consumer takes its result, so a slow reader stops the producer.
//! Results are delivered in sentence order.
//!
//! [`SynthesisPipeline::seek`] cancels the current run: units whose worker has
//! not started yet are skipped, units already rendering finish and are dropped
//! together with their audio files.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audio::AudioFormat;
use crate::config::ReaderConfig;
use crate::error::{EngineError, PipelineError, ProbeError};
use crate::probe::{DurationProbe, MediaProbe, RetryingProbe};
use crate::text::SourceText;
use crate::timing::{SynthesisResult, TimingCalculator};
use crate::{EngineOutput, SpeechEngine};

pub type SharedEngine = Arc<Mutex<Box<dyn SpeechEngine>>>;

/// One delivered unit. `result` is an error when that unit failed; the
/// pipeline carries on with the next one.
#[derive(Debug)]
pub struct UnitOutcome {
    pub index: usize,
    pub result: Result<SynthesisResult, PipelineError>,
}

/// Turn raw engine output into a timed result.
///
/// The probe is only consulted when the engine reported no usable end time.
/// On failure the clip is dropped and its file removed.
pub fn finish_unit(
    output: EngineOutput,
    text: SourceText,
    probe: &dyn DurationProbe,
    calculator: &TimingCalculator,
) -> Result<SynthesisResult, PipelineError> {
    let EngineOutput { clip, observations } = output;
    let timeline = calculator.calculate(&text, &observations, || probe.probe(&clip))?;
    Ok(SynthesisResult {
        clip,
        text,
        timeline,
    })
}

/// Synthesize and time one unit on the calling thread.
pub fn synthesize_unit(
    engine: &mut dyn SpeechEngine,
    probe: &dyn DurationProbe,
    calculator: &TimingCalculator,
    text: &str,
    output_path: &Path,
) -> Result<SynthesisResult, PipelineError> {
    let output = engine.synthesize(text, output_path)?;
    finish_unit(output, SourceText::new(text), probe, calculator)
}

/// Engine output plus anything blocking the timing calculation will need.
struct RenderedUnit {
    output: EngineOutput,
    text: SourceText,
    /// Probed up front when the observations carry no usable end time.
    duration: Option<Result<f64, ProbeError>>,
}

impl RenderedUnit {
    fn into_result(self, calculator: &TimingCalculator) -> Result<SynthesisResult, PipelineError> {
        let RenderedUnit {
            output: EngineOutput { clip, observations },
            text,
            duration,
        } = self;
        let timeline = calculator.calculate(&text, &observations, || {
            duration.unwrap_or_else(|| Err(ProbeError::NotReady(clip.path().to_path_buf())))
        })?;
        Ok(SynthesisResult {
            clip,
            text,
            timeline,
        })
    }
}

type WorkerOutput = (Option<Result<RenderedUnit, PipelineError>>, OwnedSemaphorePermit);

struct PendingUnit {
    index: usize,
    handle: JoinHandle<WorkerOutput>,
}

/// Everything a worker needs to render one unit.
struct UnitJob {
    index: usize,
    text: String,
    output_path: PathBuf,
    engine: SharedEngine,
    probe: Arc<dyn DurationProbe>,
    calculator: Arc<TimingCalculator>,
    cancel: CancellationToken,
}

impl UnitJob {
    /// `None` when the run was cancelled before rendering started.
    fn run(self) -> Option<Result<RenderedUnit, PipelineError>> {
        if self.cancel.is_cancelled() {
            log::debug!("Skipping unit {} of a cancelled run", self.index);
            return None;
        }

        let output = {
            let mut engine = match self.engine.lock() {
                Ok(engine) => engine,
                Err(_) => return Some(Err(PipelineError::Poisoned)),
            };
            // The previous holder may have been slow enough for a seek to happen.
            if self.cancel.is_cancelled() {
                log::debug!("Skipping unit {} of a cancelled run", self.index);
                return None;
            }
            engine.synthesize(&self.text, &self.output_path)
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => return Some(Err(e.into())),
        };
        let duration = self
            .calculator
            .needs_duration(&output.observations)
            .then(|| self.probe.probe(&output.clip));

        if self.cancel.is_cancelled() {
            log::debug!("Discarding unit {} of a cancelled run", self.index);
        }
        Some(Ok(RenderedUnit {
            output,
            text: SourceText::new(self.text),
            duration,
        }))
    }
}

struct Run {
    cancel: CancellationToken,
    pending: mpsc::Receiver<PendingUnit>,
    feeder: JoinHandle<()>,
}

impl Run {
    fn stop(self) {
        self.cancel.cancel();
        self.feeder.abort();
        // Dropping the receiver detaches queued workers; their results are
        // dropped when they finish.
    }
}

/// Bounded background synthesis of a sequence of sentences.
pub struct SynthesisPipeline {
    engine: SharedEngine,
    engine_name: String,
    format: AudioFormat,
    overlap: f64,
    probe: Arc<dyn DurationProbe>,
    calculator: Arc<TimingCalculator>,
    audio_dir: PathBuf,
    depth: usize,
    generation: u64,
    run: Option<Run>,
}

impl SynthesisPipeline {
    /// Pipeline probing durations with [`MediaProbe`], retried per
    /// `config.probe`.
    pub fn new(engine: Box<dyn SpeechEngine>, config: &ReaderConfig) -> Result<Self, PipelineError> {
        let probe = RetryingProbe::new(MediaProbe::new(), config.probe.clone());
        Self::with_probe(engine, Arc::new(probe), config)
    }

    pub fn with_probe(
        engine: Box<dyn SpeechEngine>,
        probe: Arc<dyn DurationProbe>,
        config: &ReaderConfig,
    ) -> Result<Self, PipelineError> {
        let audio_dir = config.audio_dir();
        std::fs::create_dir_all(&audio_dir).map_err(EngineError::from)?;

        let engine_name = engine.name().to_string();
        let overlap = config.overlap_for(&*engine);
        log::info!(
            "Synthesis pipeline for '{engine_name}': lookahead {}, overlap {overlap:.2}s, clips in {}",
            config.lookahead_depth,
            audio_dir.display()
        );

        Ok(Self {
            format: engine.output_format(),
            engine: Arc::new(Mutex::new(engine)),
            engine_name,
            overlap,
            probe,
            calculator: Arc::new(TimingCalculator::new(config.timing.clone())),
            audio_dir,
            depth: config.lookahead_depth.max(1),
            generation: 0,
            run: None,
        })
    }

    pub fn engine_name(&self) -> &str {
        &self.engine_name
    }

    /// Seconds the next unit should overlap the end of the current one.
    pub fn overlap_seconds(&self) -> f64 {
        self.overlap
    }

    pub fn lookahead_depth(&self) -> usize {
        self.depth
    }

    /// Start rendering `sentences` from index `from`, replacing any current run.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self, sentences: Vec<String>, from: usize) {
        self.cancel();
        self.generation += 1;

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.depth);
        let permits = Arc::new(Semaphore::new(self.depth));

        let generation = self.generation;
        let engine = Arc::clone(&self.engine);
        let probe = Arc::clone(&self.probe);
        let calculator = Arc::clone(&self.calculator);
        let audio_dir = self.audio_dir.clone();
        let extension = self.format.extension();
        let token = cancel.clone();

        let feeder = tokio::spawn(async move {
            for (index, text) in sentences.into_iter().enumerate().skip(from) {
                let permit = tokio::select! {
                    _ = token.cancelled() => break,
                    permit = Arc::clone(&permits).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let job = UnitJob {
                    index,
                    text,
                    output_path: audio_dir.join(format!("unit_{generation}_{index}.{extension}")),
                    engine: Arc::clone(&engine),
                    probe: Arc::clone(&probe),
                    calculator: Arc::clone(&calculator),
                    cancel: token.clone(),
                };
                let handle = tokio::task::spawn_blocking(move || (job.run(), permit));
                if tx.send(PendingUnit { index, handle }).await.is_err() {
                    break;
                }
            }
        });

        self.run = Some(Run {
            cancel,
            pending: rx,
            feeder,
        });
    }

    /// Jump to `index`: cancel everything queued and restart from there.
    pub fn seek(&mut self, sentences: Vec<String>, index: usize) {
        log::info!("Seeking to unit {index}");
        self.start(sentences, index);
    }

    /// Stop the current run, if any.
    pub fn cancel(&mut self) {
        if let Some(run) = self.run.take() {
            run.stop();
        }
    }

    /// Next unit in order, waiting for it to finish rendering.
    ///
    /// Returns `None` once every sentence has been delivered or when nothing
    /// is running. Not cancel safe: dropping the future mid-wait loses the
    /// unit being awaited.
    pub async fn next(&mut self) -> Option<UnitOutcome> {
        loop {
            let run = self.run.as_mut()?;
            let unit = run.pending.recv().await?;

            let result = match unit.handle.await {
                Ok((Some(rendered), _permit)) => {
                    rendered.and_then(|rendered| rendered.into_result(&self.calculator))
                }
                Ok((None, _permit)) => continue,
                Err(e) => Err(PipelineError::Worker(e.to_string())),
            };

            match &result {
                Ok(unit_result) => log::debug!(
                    "Unit {} ready: {:.2}s, {} words, {:?} timing",
                    unit.index,
                    unit_result.total_duration(),
                    unit_result.timings().len(),
                    unit_result.timeline.source
                ),
                Err(e) => log::warn!("Unit {} failed: {e}", unit.index),
            }
            return Some(UnitOutcome {
                index: unit.index,
                result,
            });
        }
    }
}

impl Drop for SynthesisPipeline {
    fn drop(&mut self) {
        self.cancel();
    }
}
