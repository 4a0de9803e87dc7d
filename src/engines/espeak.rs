//! espeak-ng command line engine.
//!
//! Renders WAV with `espeak-ng -w`. espeak-ng reports no word timing through
//! its command line, so every unit goes through duration-based estimation.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::audio::{AudioClip, AudioFormat};
use crate::error::EngineError;
use crate::{EngineOutput, SpeechEngine};

/// Location of the espeak-ng binary and its data directory.
///
/// Either path can be `None` to fall back to `espeak-ng` from PATH and the
/// system data directory.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    pub bin_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
}

impl EspeakConfig {
    pub fn binary(&self) -> &Path {
        self.bin_path
            .as_deref()
            .unwrap_or_else(|| Path::new("espeak-ng"))
    }

    /// Base command with the data directory applied.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(self.binary());
        if let Some(data) = &self.data_path {
            cmd.arg(format!("--path={}", data.display()));
        }
        cmd
    }
}

pub struct EspeakEngine {
    espeak: EspeakConfig,
    voice: String,
    /// Words per minute. `None` keeps the espeak-ng default (175).
    words_per_minute: Option<u32>,
    initialized: bool,
}

impl EspeakEngine {
    pub const NAME: &'static str = "espeak";

    pub fn new(voice: impl Into<String>) -> Self {
        Self::with_espeak(voice, EspeakConfig::default())
    }

    pub fn with_espeak(voice: impl Into<String>, espeak: EspeakConfig) -> Self {
        Self {
            espeak,
            voice: voice.into(),
            words_per_minute: None,
            initialized: false,
        }
    }

    pub fn with_rate(mut self, words_per_minute: u32) -> Self {
        self.words_per_minute = Some(words_per_minute);
        self
    }
}

impl SpeechEngine for EspeakEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::Wav
    }

    fn initialize(&mut self) -> Result<(), EngineError> {
        let version = super::check_binary(Self::NAME, self.espeak.binary())?;
        log::info!("Using {version} with voice '{}'", self.voice);
        self.initialized = true;
        Ok(())
    }

    fn synthesize(&mut self, text: &str, output_path: &Path) -> Result<EngineOutput, EngineError> {
        if !self.initialized {
            return Err(EngineError::NotInitialized(Self::NAME.to_string()));
        }

        let mut cmd = self.espeak.command();
        cmd.args(["-v", self.voice.as_str()]);
        if let Some(wpm) = self.words_per_minute {
            cmd.arg("-s").arg(wpm.to_string());
        }
        let mut child = cmd
            .arg("-w")
            .arg(output_path)
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes())?;
            stdin.write_all(b"\n")?;
        }
        let output = child.wait_with_output()?;
        super::check_status("espeak-ng", &output)?;

        log::debug!("espeak-ng wrote {}", output_path.display());
        Ok(EngineOutput::untimed(AudioClip::new(
            output_path,
            AudioFormat::Wav,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{DurationProbe, MediaProbe};

    fn espeak_available() -> bool {
        Command::new("espeak-ng").arg("--version").output().is_ok()
    }

    #[test]
    fn synthesize_requires_initialize() {
        let mut engine = EspeakEngine::new("en-us");
        let err = engine
            .synthesize("Hello", Path::new("unused.wav"))
            .unwrap_err();
        assert!(matches!(err, EngineError::NotInitialized(_)));
    }

    #[test]
    fn missing_binary_is_dependency_error() {
        let config = EspeakConfig {
            bin_path: Some(PathBuf::from("/nonexistent/espeak-ng")),
            data_path: None,
        };
        let mut engine = EspeakEngine::with_espeak("en-us", config);
        assert!(matches!(
            engine.initialize(),
            Err(EngineError::DependencyMissing { .. })
        ));
    }

    #[test]
    fn renders_untimed_wav() {
        if !espeak_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.wav");

        let mut engine = EspeakEngine::new("en-us");
        engine.initialize().unwrap();
        let output = engine.synthesize("Hello world.", &path).unwrap();

        assert!(output.observations.is_empty());
        let duration = MediaProbe::new().probe(&output.clip).unwrap();
        assert!(duration > 0.0);
    }
}
