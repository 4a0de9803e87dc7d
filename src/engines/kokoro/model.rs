use std::path::Path;

use ndarray::Array2;
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use crate::engines::espeak::EspeakConfig;
use crate::error::EngineError;

use super::phonemizer::{phonemize, voice_lang, Phonemes};
use super::vocab::Vocab;
use super::voices::VoiceStore;

/// Maximum number of phoneme tokens per chunk (before padding).
pub const MAX_PHONEME_LEN: usize = 510;

/// Style vector dimension for Kokoro.
pub const STYLE_DIM: usize = 256;

/// Output sample rate from the Kokoro model.
pub const SAMPLE_RATE: u32 = 24000;

/// Crossfade (in samples) used when concatenating chunk audio.
const CHUNK_CROSSFADE_SAMPLES: usize = 240; // 10ms @ 24kHz

/// Audio samples generated per predicted duration frame.
const SAMPLES_PER_FRAME: usize = 600;

#[derive(thiserror::Error, Debug)]
pub enum KokoroError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    EspeakNotFound,
    #[error("Phonemization failed: {0}")]
    PhonemizerFailed(String),
    #[error("Voice '{0}' not found in the voice archive")]
    VoiceNotFound(String),
    #[error("Invalid config.json: {0}")]
    Config(String),
    #[error("Failed to parse voice file: {0}")]
    VoiceParse(String),
}

impl From<KokoroError> for EngineError {
    fn from(e: KokoroError) -> Self {
        match e {
            KokoroError::EspeakNotFound => EngineError::missing("kokoro", e.to_string()),
            KokoroError::Io(io) => EngineError::Io(io),
            other => EngineError::SynthesisFailure(other.to_string()),
        }
    }
}

/// Output of one synthesis call.
#[derive(Debug)]
pub struct KokoroAudio {
    pub samples: Vec<f32>,
    pub phonemes: Phonemes,
    /// Start and end in seconds of every entry of `phonemes.ids`, when the
    /// model exposes predicted durations.
    pub token_times: Option<Vec<(f64, f64)>>,
}

/// Waveform and optional per-token frame counts for one chunk, pads included.
struct ChunkOutput {
    audio: Vec<f32>,
    durations: Option<Vec<f64>>,
}

/// Internal Kokoro ONNX model state.
pub struct KokoroModel {
    session: Session,
    voice_store: VoiceStore,
    vocab: Vocab,
    /// Detected input name: "input_ids" or "tokens"
    tokens_input_name: String,
    /// True if the speed input expects int32, false for float32
    speed_is_int32: bool,
    /// Name of the per-token duration output, if the export has one.
    duration_output: Option<String>,
}

impl KokoroModel {
    /// Load the Kokoro model from a directory.
    ///
    /// The directory must contain:
    /// - An `.onnx` file (preferably `kokoro-quant-convinteger.onnx`)
    /// - A `voices-v1.0.bin` voice archive
    /// - Optionally a `config.json` for vocabulary (falls back to hardcoded)
    pub fn load(
        model_dir: &Path,
        num_threads: Option<usize>,
        optimized_cache_path: Option<&Path>,
    ) -> Result<Self, KokoroError> {
        let onnx_path = find_onnx_file(model_dir)?;
        log::info!("Loading Kokoro model from {}", onnx_path.display());

        let session = init_session(&onnx_path, num_threads, optimized_cache_path)?;

        let tokens_input_name = detect_tokens_input(&session);
        let speed_is_int32 = detect_speed_type(&session);
        let duration_output = detect_duration_output(&session);

        log::info!(
            "Detected: tokens_input='{}', speed_is_int32={}, duration_output={:?}",
            tokens_input_name,
            speed_is_int32,
            duration_output
        );

        let voices_path = model_dir.join("voices-v1.0.bin");
        if !voices_path.exists() {
            return Err(KokoroError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!(
                    "Voice file not found at {}. Download it from the Kokoro model repository.",
                    voices_path.display()
                ),
            )));
        }
        let voice_store = VoiceStore::load(&voices_path)?;

        let config_path = model_dir.join("config.json");
        let vocab = if config_path.exists() {
            log::info!("Loading vocab from config.json");
            Vocab::load(&config_path)?
        } else {
            log::warn!("config.json not found, using hardcoded vocab");
            Vocab::builtin()
        };

        Ok(Self {
            session,
            voice_store,
            vocab,
            tokens_input_name,
            speed_is_int32,
            duration_output,
        })
    }

    /// Whether synthesis can report per-token timing.
    pub fn has_duration_output(&self) -> bool {
        self.duration_output.is_some()
    }

    /// Token ID espeak-ng word separators map to.
    pub fn space_id(&self) -> Option<i64> {
        self.vocab.space()
    }

    /// Synthesize audio from text using the given voice and speed.
    pub fn synthesize_text(
        &mut self,
        text: &str,
        voice_name: &str,
        speed: f32,
        style_idx_override: Option<usize>,
        espeak: &EspeakConfig,
    ) -> Result<KokoroAudio, KokoroError> {
        let lang = voice_lang(voice_name);
        let phonemes = phonemize(text, lang, &self.vocab, espeak)?;

        if phonemes.ids.is_empty() {
            log::warn!("No phoneme tokens produced for text: {text:?}");
            return Ok(KokoroAudio {
                samples: Vec::new(),
                phonemes,
                token_times: None,
            });
        }

        // Keep a stable style index so adjacent chunks don't change prosody.
        let ids = &phonemes.ids;
        let style_idx = style_idx_override.unwrap_or(ids.len());
        let chunks = if ids.len() > MAX_PHONEME_LEN {
            log::debug!(
                "Kokoro phoneme sequence exceeded limit ({} > {}), chunking",
                ids.len(),
                MAX_PHONEME_LEN
            );
            split_chunks(ids, &self.vocab)
        } else {
            vec![ids.clone()]
        };

        let mut combined = Vec::with_capacity(ids.len() * 300);
        let mut token_times = self
            .duration_output
            .as_ref()
            .map(|_| Vec::with_capacity(ids.len()));

        for chunk_ids in chunks.iter() {
            let style = self.voice_store.get_style(voice_name, style_idx)?;
            let chunk = self.synthesize_chunk(chunk_ids, &style, speed)?;

            let overlap = if combined.is_empty() {
                0
            } else {
                CHUNK_CROSSFADE_SAMPLES
                    .min(combined.len())
                    .min(chunk.audio.len())
            };
            let offset_secs = (combined.len() - overlap) as f64 / SAMPLE_RATE as f64;

            token_times = match (token_times, chunk.durations) {
                (Some(mut times), Some(durations)) => {
                    match chunk_token_times(&durations, chunk_ids.len(), offset_secs) {
                        Some(spans) => {
                            times.extend(spans);
                            Some(times)
                        }
                        None => {
                            log::warn!(
                                "Duration output has {} entries for {} tokens, dropping timing",
                                durations.len(),
                                chunk_ids.len() + 2
                            );
                            None
                        }
                    }
                }
                _ => None,
            };

            if chunk.audio.is_empty() {
                continue;
            }
            if combined.is_empty() {
                combined.extend_from_slice(&chunk.audio);
            } else {
                append_with_crossfade(&mut combined, &chunk.audio, CHUNK_CROSSFADE_SAMPLES);
            }
        }

        Ok(KokoroAudio {
            samples: combined,
            phonemes,
            token_times,
        })
    }

    /// Run ONNX inference on a single chunk of phoneme token IDs.
    fn synthesize_chunk(
        &mut self,
        tokens: &[i64],
        style: &[f32; STYLE_DIM],
        speed: f32,
    ) -> Result<ChunkOutput, KokoroError> {
        let seq_len = tokens.len() + 2; // +2 for padding tokens

        // Build tokens tensor: [[0, t1..tN, 0]]
        let mut padded = vec![0i64; seq_len];
        padded[1..seq_len - 1].copy_from_slice(tokens);
        let tokens_arr = Array2::from_shape_vec((1, seq_len), padded)?;

        // [[s0..s255]]
        let style_view = ndarray::ArrayView2::from_shape((1, STYLE_DIM), style.as_slice())?;

        let output = if self.speed_is_int32 {
            let speed_arr = ndarray::arr1(&[speed as i32]);
            let inputs = inputs![
                self.tokens_input_name.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "style" => TensorRef::from_array_view(style_view)?,
                "speed" => TensorRef::from_array_view(speed_arr.view())?,
            ];
            self.session.run(inputs)?
        } else {
            let speed_arr = ndarray::arr1(&[speed]);
            let inputs = inputs![
                self.tokens_input_name.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "style" => TensorRef::from_array_view(style_view)?,
                "speed" => TensorRef::from_array_view(speed_arr.view())?,
            ];
            self.session.run(inputs)?
        };

        let mut audio = None;
        let mut durations = None;
        for (name, value) in output.iter() {
            if self.duration_output.as_deref() == Some(name) {
                durations = value
                    .try_extract_array::<i64>()
                    .map(|arr| arr.iter().map(|&d| d as f64).collect::<Vec<_>>())
                    .or_else(|_| {
                        value
                            .try_extract_array::<f32>()
                            .map(|arr| arr.iter().map(|&d| f64::from(d)).collect())
                    })
                    .map_err(|e| log::warn!("Unreadable duration output '{name}': {e}"))
                    .ok();
            } else if audio.is_none() {
                let waveform = value.try_extract_array::<f32>()?;
                audio = Some(waveform.iter().copied().collect::<Vec<f32>>());
            }
        }

        let audio =
            audio.ok_or_else(|| KokoroError::Ort(ort::Error::new("No waveform output from model")))?;
        Ok(ChunkOutput { audio, durations })
    }

    /// List all available voice names.
    pub fn list_voices(&self) -> Vec<&str> {
        self.voice_store.list_voices()
    }
}

/// Find the ONNX model file in the given directory.
///
/// Prefers `kokoro-quant-convinteger.onnx`, then falls back to the first `.onnx` file found.
fn find_onnx_file(model_dir: &Path) -> Result<std::path::PathBuf, KokoroError> {
    let preferred = model_dir.join("kokoro-quant-convinteger.onnx");
    if preferred.exists() {
        return Ok(preferred);
    }

    // Scan for any .onnx file
    for entry in std::fs::read_dir(model_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("onnx") {
            log::info!("Using ONNX file: {}", path.display());
            return Ok(path);
        }
    }

    Err(KokoroError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("No .onnx file found in {}", model_dir.display()),
    )))
}

/// Build the ONNX session, caching the Level3-optimized graph when
/// `optimized_cache_path` is set. A cached graph is loaded without further
/// optimization.
fn init_session(
    onnx_path: &Path,
    num_threads: Option<usize>,
    optimized_cache_path: Option<&Path>,
) -> Result<Session, KokoroError> {
    let providers = vec![CPUExecutionProvider::default().build()];

    let (load_path, opt_level, write_cache) = match optimized_cache_path {
        Some(cache) if cache.exists() => {
            log::info!("Loading pre-optimized Kokoro graph from {}", cache.display());
            (cache, GraphOptimizationLevel::Disable, false)
        }
        Some(cache) => {
            log::info!(
                "Optimizing Kokoro graph, caching it at {}",
                cache.display()
            );
            (onnx_path, GraphOptimizationLevel::Level3, true)
        }
        None => (onnx_path, GraphOptimizationLevel::Level3, false),
    };

    let mut builder = Session::builder()?
        .with_optimization_level(opt_level)?
        .with_execution_providers(providers)?
        .with_parallel_execution(true)?;

    if let (true, Some(cache)) = (write_cache, optimized_cache_path) {
        builder = builder.with_optimized_model_path(cache)?;
    }

    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    Ok(builder.commit_from_file(load_path)?)
}

/// Detect the token input name ("input_ids" or "tokens") from session inputs.
fn detect_tokens_input(session: &Session) -> String {
    for input in session.inputs() {
        if input.name() == "input_ids" || input.name() == "tokens" {
            return input.name().to_string();
        }
    }
    // Default to "input_ids" if neither is found
    "input_ids".to_string()
}

/// Find an output carrying predicted per-token durations ("duration",
/// "pred_dur", ...).
fn detect_duration_output(session: &Session) -> Option<String> {
    session
        .outputs()
        .iter()
        .map(|output| output.name())
        .find(|name| name.contains("dur"))
        .map(str::to_string)
}

/// Detect whether the speed input expects int32 (true) or float32 (false).
fn detect_speed_type(session: &Session) -> bool {
    for input in session.inputs() {
        if input.name() == "speed" {
            let type_str = format!("{:?}", input.dtype());
            return type_str.contains("Int32") || type_str.contains("int32");
        }
    }
    // Default: modern Kokoro models use int32
    true
}

/// Split phoneme IDs into chunks of at most `MAX_PHONEME_LEN`, preferring punctuation.
fn split_chunks(ids: &[i64], vocab: &Vocab) -> Vec<Vec<i64>> {
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < ids.len() {
        let end = (start + MAX_PHONEME_LEN).min(ids.len());
        if end == ids.len() {
            chunks.push(ids[start..end].to_vec());
            break;
        }

        // Split after the last punctuation before `end`, if any.
        let split = ids[start..end]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, &id)| vocab.is_boundary(id))
            .map(|(i, _)| start + i + 1)
            .unwrap_or(end);

        chunks.push(ids[start..split].to_vec());
        start = split;
    }

    chunks
}

/// Per-token spans for one chunk from the model's frame counts.
///
/// `durations` covers the padded sequence `[pad, t1..tN, pad]`; the leading
/// pad's frames shift every token. Returns `None` when the lengths disagree.
fn chunk_token_times(durations: &[f64], token_count: usize, offset_secs: f64) -> Option<Vec<(f64, f64)>> {
    if durations.len() != token_count + 2 {
        return None;
    }
    let frame_secs = SAMPLES_PER_FRAME as f64 / SAMPLE_RATE as f64;
    let mut cursor = offset_secs + durations[0].max(0.0) * frame_secs;

    Some(
        durations[1..=token_count]
            .iter()
            .map(|&frames| {
                let start = cursor;
                cursor += frames.max(0.0) * frame_secs;
                (start, cursor)
            })
            .collect(),
    )
}

fn append_with_crossfade(dst: &mut Vec<f32>, src: &[f32], crossfade_samples: usize) {
    let overlap = crossfade_samples.min(dst.len()).min(src.len());
    if overlap == 0 {
        dst.extend_from_slice(src);
        return;
    }

    let dst_start = dst.len() - overlap;
    for i in 0..overlap {
        let t = (i + 1) as f32 / (overlap as f32 + 1.0);
        let left = dst[dst_start + i] * (1.0 - t);
        let right = src[i] * t;
        dst[dst_start + i] = left + right;
    }

    dst.extend_from_slice(&src[overlap..]);
}
