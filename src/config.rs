//! Reader and timing configuration.
//!
//! Every field has a default, so a config file only needs to name what it
//! overrides:
//!
//! ```json
//! {
//!   "default_engine": "kokoro",
//!   "lookahead_depth": 3,
//!   "timing": { "seconds_per_word": 0.35 }
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::SpeechEngine;

/// How a multi-word engine segment is divided between its words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitRule {
    /// Proportional to the normalized character length of each word. Words
    /// of equal length get equal shares, assigned left to right.
    #[default]
    CharacterLength,
    /// Every word gets the same share regardless of length.
    Equal,
}

/// Parameters for the timing calculator.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(default, build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct TimingConfig {
    /// Seconds per word used when no duration can be probed.
    pub seconds_per_word: f64,
    /// Tie-break rule for multi-word engine segments.
    pub split_rule: SplitRule,
    /// How many tokens (or engine words) the aligner may skip while looking
    /// for a match before giving up on the current pair.
    pub match_lookahead: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            seconds_per_word: 0.3,
            split_rule: SplitRule::CharacterLength,
            match_lookahead: 3,
        }
    }
}

impl TimingConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(spw) = self.seconds_per_word {
            if !spw.is_finite() || spw <= 0.0 {
                return Err(format!("seconds_per_word must be positive, got {spw}"));
            }
        }
        Ok(())
    }
}

/// Retry policy for the duration probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each retry.
    pub initial_backoff_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
        }
    }
}

/// Top-level reader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Engine selected when the user does not pick one.
    pub default_engine: String,
    /// Voice per engine name.
    pub voices: HashMap<String, String>,
    /// Maximum number of synthesized units buffered ahead of playback.
    pub lookahead_depth: usize,
    /// Seconds the next unit overlaps the end of the current one.
    pub overlap_seconds: f64,
    /// Per-engine overrides of `overlap_seconds`.
    pub engine_overlap_seconds: HashMap<String, f64>,
    /// Directory for rendered clips. `None` uses the system temp dir.
    pub audio_dir: Option<PathBuf>,
    /// Directory holding the Kokoro ONNX model and voice archive.
    pub kokoro_model_dir: PathBuf,
    pub timing: TimingConfig,
    pub probe: ProbeConfig,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        let voices = HashMap::from([
            ("edge".to_string(), "en-US-JennyNeural".to_string()),
            ("kokoro".to_string(), "af_heart".to_string()),
            ("espeak".to_string(), "en-us".to_string()),
        ]);
        let engine_overlap_seconds = HashMap::from([("kokoro".to_string(), 0.6)]);

        Self {
            default_engine: "edge".to_string(),
            voices,
            lookahead_depth: 4,
            overlap_seconds: 0.5,
            engine_overlap_seconds,
            audio_dir: None,
            kokoro_model_dir: PathBuf::from("models/kokoro"),
            timing: TimingConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}

impl ReaderConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        log::info!("Loaded reader config from {}", path.display());
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lookahead_depth == 0 {
            return Err(ConfigError::Invalid(
                "lookahead_depth must be at least 1".to_string(),
            ));
        }
        let spw = self.timing.seconds_per_word;
        if !spw.is_finite() || spw <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "timing.seconds_per_word must be positive, got {spw}"
            )));
        }
        if self.probe.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "probe.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Voice configured for `engine`, if any.
    pub fn voice_for(&self, engine: &str) -> Option<&str> {
        self.voices.get(engine).map(String::as_str)
    }

    /// Overlap between consecutive units for `engine`: the per-engine
    /// override, then the engine's own preference, then `overlap_seconds`.
    pub fn overlap_for(&self, engine: &dyn SpeechEngine) -> f64 {
        self.engine_overlap_seconds
            .get(engine.name())
            .copied()
            .or_else(|| engine.overlap_seconds())
            .unwrap_or(self.overlap_seconds)
    }

    /// Directory clips are rendered into.
    pub fn audio_dir(&self) -> PathBuf {
        self.audio_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("tts-wordsync"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"default_engine": "kokoro", "timing": {{"seconds_per_word": 0.4}}}}"#
        )
        .unwrap();

        let config = ReaderConfig::load(file.path()).unwrap();
        assert_eq!(config.default_engine, "kokoro");
        assert_eq!(config.timing.seconds_per_word, 0.4);
        assert_eq!(config.timing.match_lookahead, 3);
        assert_eq!(config.lookahead_depth, 4);
        assert_eq!(config.voice_for("kokoro"), Some("af_heart"));
    }

    #[test]
    fn rejects_zero_lookahead() {
        let config = ReaderConfig {
            lookahead_depth: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    struct OverlapEngine {
        name: &'static str,
        overlap: Option<f64>,
    }

    impl SpeechEngine for OverlapEngine {
        fn name(&self) -> &str {
            self.name
        }

        fn output_format(&self) -> crate::AudioFormat {
            crate::AudioFormat::Wav
        }

        fn initialize(&mut self) -> Result<(), crate::EngineError> {
            Ok(())
        }

        fn synthesize(
            &mut self,
            _text: &str,
            output_path: &Path,
        ) -> Result<crate::EngineOutput, crate::EngineError> {
            Ok(crate::EngineOutput::untimed(crate::AudioClip::borrowed(
                output_path,
                crate::AudioFormat::Wav,
            )))
        }

        fn overlap_seconds(&self) -> Option<f64> {
            self.overlap
        }
    }

    #[test]
    fn overlap_prefers_config_override_then_engine_then_default() {
        let config = ReaderConfig::default();

        let kokoro = OverlapEngine {
            name: "kokoro",
            overlap: Some(0.9),
        };
        assert_eq!(config.overlap_for(&kokoro), 0.6);

        let espeak = OverlapEngine {
            name: "espeak",
            overlap: Some(0.2),
        };
        assert_eq!(config.overlap_for(&espeak), 0.2);

        let plain = OverlapEngine {
            name: "espeak",
            overlap: None,
        };
        assert_eq!(config.overlap_for(&plain), 0.5);
    }

    #[test]
    fn builder_validates_seconds_per_word() {
        let config = TimingConfigBuilder::default()
            .split_rule(SplitRule::Equal)
            .build()
            .unwrap();
        assert_eq!(config.split_rule, SplitRule::Equal);
        assert_eq!(config.seconds_per_word, 0.3);

        assert!(TimingConfigBuilder::default()
            .seconds_per_word(-1.0)
            .build()
            .is_err());
    }

    #[test]
    fn split_rule_uses_snake_case() {
        let rule: SplitRule = serde_json::from_str("\"character_length\"").unwrap();
        assert_eq!(rule, SplitRule::CharacterLength);
    }
}
