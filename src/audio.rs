//! Rendered audio: the clip handed downstream and raw PCM from local models.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Container format an engine renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A rendered audio file for one synthesis unit.
///
/// Read-only once returned by an engine. An owned clip deletes its file when
/// dropped, so discarding a result releases the disk it used.
#[derive(Debug)]
pub struct AudioClip {
    path: PathBuf,
    format: AudioFormat,
    owned: bool,
}

impl AudioClip {
    /// Wrap a file this clip owns and removes on drop.
    pub fn new(path: impl Into<PathBuf>, format: AudioFormat) -> Self {
        Self {
            path: path.into(),
            format,
            owned: true,
        }
    }

    /// Wrap a file owned by someone else. It is left in place on drop.
    pub fn borrowed(path: impl Into<PathBuf>, format: AudioFormat) -> Self {
        Self {
            path: path.into(),
            format,
            owned: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Stop managing the file and return its path.
    pub fn persist(mut self) -> PathBuf {
        self.owned = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for AudioClip {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Released audio clip {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {}: {e}", self.path.display()),
        }
    }
}

/// Mono f32 samples produced by an in-process model.
#[derive(Debug)]
pub struct PcmAudio {
    /// Raw audio samples as f32 values
    pub samples: Vec<f32>,
    /// Sample rate of the audio (24000 for Kokoro)
    pub sample_rate: u32,
}

impl PcmAudio {
    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
