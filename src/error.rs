//! Error types shared across engines, probing, timing and the pipeline.

use std::path::PathBuf;

/// Errors reported by a [`SpeechEngine`](crate::SpeechEngine).
///
/// Absence of timing is not an error: an engine that cannot time its output
/// returns an empty observation list instead.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// The engine cannot initialize (missing binary, library or model).
    #[error("engine '{engine}' unavailable: {reason}")]
    DependencyMissing { engine: String, reason: String },

    /// `synthesize` was called before a successful `initialize`.
    #[error("engine '{0}' has not been initialized")]
    NotInitialized(String),

    /// A single unit failed to render.
    #[error("synthesis failed: {0}")]
    SynthesisFailure(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write WAV output: {0}")]
    Wav(#[from] hound::Error),
}

impl EngineError {
    pub(crate) fn missing(engine: &str, reason: impl Into<String>) -> Self {
        Self::DependencyMissing {
            engine: engine.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors reported by a [`DurationProbe`](crate::probe::DurationProbe).
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    /// The file is missing, empty or truncated. May still be being written.
    #[error("audio file {0} is not ready")]
    NotReady(PathBuf),

    /// The container could not be understood. Fatal for this clip.
    #[error("unsupported or corrupt audio container {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    /// The external media-inspection tool is not installed.
    #[error("media probe tool '{0}' not found")]
    ToolMissing(String),

    #[error("I/O error while probing: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotReady(_))
    }
}

/// Fatal timing failures. Everything else degrades into estimation.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TimingError {
    #[error("cannot determine total duration for {words} words: {reason}")]
    InvariantViolation { words: usize, reason: String },
}

/// Per-unit failures surfaced by the lookahead pipeline.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Timing(#[from] TimingError),

    #[error("synthesis worker failed: {0}")]
    Worker(String),

    #[error("engine lock poisoned")]
    Poisoned,
}

/// Configuration loading failures.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
