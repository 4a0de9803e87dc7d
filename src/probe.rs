//! Audio duration probing.
//!
//! WAV clips are measured from their header with `hound`. Anything else is
//! handed to `ffprobe`:
//!
//! ```text
//! ffprobe -v error -show_entries format=duration -of default=noprint_wrappers=1:nokey=1 <file>
//! ```

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use crate::audio::{AudioClip, AudioFormat};
use crate::config::ProbeConfig;
use crate::error::ProbeError;

/// Reports the playable duration of a rendered clip, in seconds.
pub trait DurationProbe: Send + Sync {
    fn probe(&self, clip: &AudioClip) -> Result<f64, ProbeError>;
}

/// Probe that reads WAV headers directly and shells out to `ffprobe` for
/// compressed formats.
#[derive(Debug, Clone)]
pub struct MediaProbe {
    ffprobe: PathBuf,
}

impl Default for MediaProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaProbe {
    /// Use `ffprobe` from PATH.
    pub fn new() -> Self {
        Self {
            ffprobe: PathBuf::from("ffprobe"),
        }
    }

    /// Use a specific `ffprobe` binary.
    pub fn with_ffprobe(path: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: path.into(),
        }
    }

    fn ffprobe_duration(&self, path: &Path) -> Result<f64, ProbeError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ProbeError::ToolMissing(self.ffprobe.display().to_string())
                } else {
                    ProbeError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Unsupported {
                path: path.to_path_buf(),
                reason: format!(
                    "ffprobe exited with code {:?}: {}",
                    output.status.code(),
                    stderr.trim()
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let value = stdout.trim();
        value.parse::<f64>().map_err(|_| ProbeError::Unsupported {
            path: path.to_path_buf(),
            reason: format!("unexpected ffprobe output {value:?}"),
        })
    }
}

impl DurationProbe for MediaProbe {
    fn probe(&self, clip: &AudioClip) -> Result<f64, ProbeError> {
        let path = clip.path();
        ensure_present(path)?;

        match clip.format() {
            AudioFormat::Wav => wav_duration(path),
            AudioFormat::Mp3 => self.ffprobe_duration(path),
        }
    }
}

/// Missing and zero-length files may still be being written.
fn ensure_present(path: &Path) -> Result<(), ProbeError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(ProbeError::NotReady(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ProbeError::NotReady(path.to_path_buf()))
        }
        Err(e) => Err(ProbeError::Io(e)),
    }
}

fn wav_duration(path: &Path) -> Result<f64, ProbeError> {
    // hound reports a short header read as a generic I/O error, while a wrong
    // RIFF tag or chunk layout is a format error. A file that exists but
    // whose header cannot be read yet is still being written.
    let reader = hound::WavReader::open(path).map_err(|e| match e {
        hound::Error::IoError(io) => {
            log::debug!("Incomplete WAV header in {}: {io}", path.display());
            ProbeError::NotReady(path.to_path_buf())
        }
        other => ProbeError::Unsupported {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    })?;

    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(ProbeError::Unsupported {
            path: path.to_path_buf(),
            reason: "sample rate is zero".to_string(),
        });
    }

    // A writer that has not finalized yet leaves the data length at zero.
    let frames = reader.duration();
    if frames == 0 {
        return Err(ProbeError::NotReady(path.to_path_buf()));
    }

    Ok(frames as f64 / spec.sample_rate as f64)
}

/// Retries [`ProbeError::NotReady`] with bounded exponential backoff.
///
/// Every other failure is returned immediately.
#[derive(Debug, Clone)]
pub struct RetryingProbe<P> {
    inner: P,
    config: ProbeConfig,
}

impl<P: DurationProbe> RetryingProbe<P> {
    pub fn new(inner: P, config: ProbeConfig) -> Self {
        Self { inner, config }
    }
}

impl<P: DurationProbe> DurationProbe for RetryingProbe<P> {
    fn probe(&self, clip: &AudioClip) -> Result<f64, ProbeError> {
        let attempts = self.config.max_attempts.max(1);
        let mut backoff = Duration::from_millis(self.config.initial_backoff_ms);
        let mut attempt = 1;

        loop {
            match self.inner.probe(clip) {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    log::debug!(
                        "Probe attempt {attempt}/{attempts} for {} not ready, retrying in {backoff:?}",
                        clip.path().display()
                    );
                    thread::sleep(backoff);
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
