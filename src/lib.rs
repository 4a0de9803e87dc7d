//! # tts-wordsync
//!
//! Word-level timing for text-to-speech read-along playback.
//!
//! Speech engines report timing in incompatible shapes: word-boundary events,
//! per-phoneme durations, or nothing at all. This crate normalizes all of them
//! into one canonical timeline per synthesized unit (one timing per source
//! word, continuous, ending exactly at the clip's duration) and drives word
//! highlighting from a monotonic clock while audio plays.
//!
//! ## Features
//!
//! - **Engine adapters**: espeak-ng and edge-tts out of the box, Kokoro behind
//!   the `kokoro` feature
//! - **Timing calculator**: greedy alignment, gap and overlap removal, and
//!   duration-based estimation when an engine has no timing
//! - **Lookahead pipeline**: bounded background synthesis of upcoming sentences
//!   with cancellation on seek
//! - **Playback synchronizer**: pause, resume and speed changes without
//!   rewriting timings
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! tts-wordsync = { version = "2026.2", features = ["kokoro"] }
//! ```
//!
//! ```ignore
//! use std::path::Path;
//! use tts_wordsync::{
//!     engines::espeak::EspeakEngine, probe::MediaProbe, SourceText, SpeechEngine,
//!     TimingCalculator,
//! };
//!
//! let mut engine = EspeakEngine::new("en-us");
//! engine.initialize()?;
//!
//! let text = SourceText::new("Hello, world!");
//! let output = engine.synthesize(text.text(), Path::new("hello.wav"))?;
//! let timeline = TimingCalculator::default().calculate(&text, &output.observations, || {
//!     MediaProbe::new().probe(&output.clip)
//! })?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod config;
pub mod engines;
pub mod error;
pub mod pipeline;
pub mod playback;
pub mod probe;
pub mod registry;
pub mod text;
pub mod timing;

use std::path::Path;

pub use audio::{AudioClip, AudioFormat};
pub use config::{ReaderConfig, TimingConfig};
pub use error::{EngineError, PipelineError, ProbeError, TimingError};
pub use playback::{PlaybackSynchronizer, SyncEvent};
pub use text::SourceText;
pub use timing::{
    CanonicalWordTiming, RawTimingObservation, SynthesisResult, TimingCalculator, WordTimeline,
};

/// What an engine hands back for one unit: the rendered clip and whatever
/// timing it could report.
#[derive(Debug)]
pub struct EngineOutput {
    pub clip: AudioClip,
    /// Time-ordered but otherwise untrusted. Empty when the engine has no
    /// timing of its own.
    pub observations: Vec<RawTimingObservation>,
}

impl EngineOutput {
    /// Output of an engine that cannot time its speech.
    pub fn untimed(clip: AudioClip) -> Self {
        Self {
            clip,
            observations: Vec::new(),
        }
    }
}

/// Common interface for text-to-speech engines.
///
/// Engines are driven from a single worker at a time. `synthesize` blocks until
/// the audio file is completely written.
pub trait SpeechEngine: Send {
    /// Registry key, e.g. `"kokoro"`.
    fn name(&self) -> &str;

    /// Container format written by `synthesize`.
    fn output_format(&self) -> AudioFormat;

    /// Check dependencies and load models.
    ///
    /// Returns [`EngineError::DependencyMissing`] when a required binary,
    /// library or model is unavailable.
    fn initialize(&mut self) -> Result<(), EngineError>;

    /// Render `text` into `output_path`.
    ///
    /// The returned clip owns `output_path`.
    fn synthesize(&mut self, text: &str, output_path: &Path) -> Result<EngineOutput, EngineError>;

    /// Optional short synthesis after initialization to hide first-call
    /// latency. Failures are logged by the caller and otherwise ignored.
    fn warm_up(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Preferred overlap in seconds between consecutive units, when the
    /// engine's audio has trailing silence worth skipping.
    fn overlap_seconds(&self) -> Option<f64> {
        None
    }
}
