use std::path::{Path, PathBuf};

use crate::audio::{AudioClip, AudioFormat, PcmAudio};
use crate::engines::espeak::EspeakConfig;
use crate::error::EngineError;
use crate::{EngineOutput, SpeechEngine};

use super::model::{KokoroModel, SAMPLE_RATE};
use super::timing::word_observations;

/// Parameters for configuring Kokoro model loading.
#[derive(Debug, Clone, Default)]
pub struct KokoroModelParams {
    /// Number of CPU threads to use for inference.
    /// `None` uses the ORT default (typically all available cores).
    pub num_threads: Option<usize>,
    /// Where to cache the Level3-optimized ONNX graph. Later loads read it
    /// back and skip optimization. Must be writable.
    pub optimized_model_cache_path: Option<PathBuf>,
}

/// Parameters for configuring Kokoro synthesis.
#[derive(Debug, Clone)]
pub struct KokoroInferenceParams {
    /// Voice name (e.g. `"af_heart"`, `"bf_emma"`, `"jf_alpha"`).
    pub voice: String,
    /// Speech speed multiplier. Range: 0.5–2.0, default 1.0.
    pub speed: f32,
    /// Override the style vector index. `None` = auto (uses phoneme token count).
    pub style_index: Option<usize>,
}

impl Default for KokoroInferenceParams {
    fn default() -> Self {
        Self {
            voice: "af_heart".to_string(),
            speed: 1.0,
            style_index: None,
        }
    }
}

/// Kokoro text-to-speech engine.
///
/// Uses the Kokoro-82M ONNX model with espeak-ng phonemization. When the model
/// export includes a duration output, word timing is derived from it;
/// otherwise the engine reports no timing.
///
/// ```rust,no_run
/// use tts_wordsync::{engines::kokoro::KokoroEngine, SpeechEngine};
/// use std::path::Path;
///
/// let mut engine = KokoroEngine::new("models/kokoro");
/// engine.initialize()?;
/// let output = engine.synthesize("Hello, world!", Path::new("hello.wav"))?;
/// println!("{} timed segments", output.observations.len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct KokoroEngine {
    model: Option<KokoroModel>,
    model_dir: PathBuf,
    model_params: KokoroModelParams,
    params: KokoroInferenceParams,
    espeak: EspeakConfig,
}

impl KokoroEngine {
    pub const NAME: &'static str = "kokoro";

    /// Create an engine for the model in `model_dir`, using `espeak-ng` from PATH.
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model: None,
            model_dir: model_dir.into(),
            model_params: KokoroModelParams::default(),
            params: KokoroInferenceParams::default(),
            espeak: EspeakConfig::default(),
        }
    }

    /// Use a bundled espeak-ng binary and data directory.
    pub fn with_espeak(mut self, espeak: EspeakConfig) -> Self {
        self.espeak = espeak;
        self
    }

    pub fn with_model_params(mut self, params: KokoroModelParams) -> Self {
        self.model_params = params;
        self
    }

    pub fn with_params(mut self, params: KokoroInferenceParams) -> Self {
        self.params = params;
        self
    }

    pub fn set_voice(&mut self, voice: impl Into<String>) {
        self.params.voice = voice.into();
    }

    /// List all available voice names (empty until initialized).
    pub fn list_voices(&self) -> Vec<&str> {
        self.model
            .as_ref()
            .map(|m| m.list_voices())
            .unwrap_or_default()
    }
}

impl SpeechEngine for KokoroEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::Wav
    }

    fn initialize(&mut self) -> Result<(), EngineError> {
        crate::engines::check_binary(Self::NAME, self.espeak.binary())?;

        let model = KokoroModel::load(
            &self.model_dir,
            self.model_params.num_threads,
            self.model_params.optimized_model_cache_path.as_deref(),
        )
        .map_err(|e| EngineError::missing(Self::NAME, e.to_string()))?;

        if !model.has_duration_output() {
            log::warn!("Kokoro model exposes no duration output; timing will be estimated");
        }
        self.model = Some(model);
        log::info!("Kokoro ready with voice '{}'", self.params.voice);
        Ok(())
    }

    fn synthesize(&mut self, text: &str, output_path: &Path) -> Result<EngineOutput, EngineError> {
        let model = self
            .model
            .as_mut()
            .ok_or_else(|| EngineError::NotInitialized(Self::NAME.to_string()))?;

        let p = &self.params;
        let audio = model.synthesize_text(text, &p.voice, p.speed, p.style_index, &self.espeak)?;
        if audio.samples.is_empty() {
            return Err(EngineError::SynthesisFailure(format!(
                "Kokoro produced no audio for {text:?}"
            )));
        }

        let pcm = PcmAudio {
            samples: audio.samples,
            sample_rate: SAMPLE_RATE,
        };
        pcm.write_wav(output_path)?;
        let clip = AudioClip::new(output_path, AudioFormat::Wav);

        let observations = match &audio.token_times {
            Some(times) => word_observations(
                &audio.phonemes.parts,
                &audio.phonemes.ids,
                times,
                model.space_id(),
            ),
            None => Vec::new(),
        };

        log::debug!(
            "Kokoro rendered {:.2}s with {} timed segments",
            pcm.duration_secs(),
            observations.len()
        );
        Ok(EngineOutput { clip, observations })
    }

    fn warm_up(&mut self) -> Result<(), EngineError> {
        let path = std::env::temp_dir().join("tts-wordsync-kokoro-warmup.wav");
        let output = self.synthesize("Hello.", &path)?;
        drop(output);
        Ok(())
    }

    fn overlap_seconds(&self) -> Option<f64> {
        Some(0.6)
    }
}
