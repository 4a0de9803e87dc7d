//! Microsoft Edge neural voices through the `edge-tts` command line.
//!
//! `edge-tts` writes MP3 media and, alongside it, a subtitle file built from
//! the service's word-boundary events. Depending on the `edge-tts` version the
//! subtitles are SRT or WebVTT and each cue holds one word or a short phrase.
//! Cues are converted to [`WordBoundary`] events; phrases are split across
//! their words later by the timing calculator.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use crate::audio::{AudioClip, AudioFormat};
use crate::error::EngineError;
use crate::timing::WordBoundary;
use crate::{EngineOutput, SpeechEngine};

pub struct EdgeEngine {
    bin_path: PathBuf,
    voice: String,
    /// Speaking rate adjustment in edge-tts syntax, e.g. `"+10%"`.
    rate: Option<String>,
    initialized: bool,
}

impl EdgeEngine {
    pub const NAME: &'static str = "edge";

    pub fn new(voice: impl Into<String>) -> Self {
        Self {
            bin_path: PathBuf::from("edge-tts"),
            voice: voice.into(),
            rate: None,
            initialized: false,
        }
    }

    pub fn with_binary(mut self, bin_path: impl Into<PathBuf>) -> Self {
        self.bin_path = bin_path.into();
        self
    }

    pub fn with_rate(mut self, rate: impl Into<String>) -> Self {
        self.rate = Some(rate.into());
        self
    }
}

impl SpeechEngine for EdgeEngine {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn output_format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    fn initialize(&mut self) -> Result<(), EngineError> {
        let version = super::check_binary(Self::NAME, &self.bin_path)?;
        log::info!("Using {version} with voice '{}'", self.voice);
        self.initialized = true;
        Ok(())
    }

    fn synthesize(&mut self, text: &str, output_path: &Path) -> Result<EngineOutput, EngineError> {
        if !self.initialized {
            return Err(EngineError::NotInitialized(Self::NAME.to_string()));
        }

        let subtitles_path = output_path.with_extension("subs");
        let mut cmd = Command::new(&self.bin_path);
        cmd.arg("--voice")
            .arg(&self.voice)
            .arg(format!("--text={text}"))
            .arg("--write-media")
            .arg(output_path)
            .arg("--write-subtitles")
            .arg(&subtitles_path);
        if let Some(rate) = &self.rate {
            cmd.arg(format!("--rate={rate}"));
        }

        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()?;
        let clip = AudioClip::new(output_path, AudioFormat::Mp3);
        super::check_status("edge-tts", &output)?;

        let observations = match std::fs::read_to_string(&subtitles_path) {
            Ok(content) => parse_subtitles(&content)
                .into_iter()
                .map(WordBoundary::into_observation)
                .collect(),
            Err(e) => {
                log::warn!(
                    "No subtitles from edge-tts at {}: {e}",
                    subtitles_path.display()
                );
                Vec::new()
            }
        };
        if let Err(e) = std::fs::remove_file(&subtitles_path) {
            log::debug!("Could not remove {}: {e}", subtitles_path.display());
        }

        log::debug!(
            "edge-tts wrote {} with {} timed cues",
            output_path.display(),
            observations.len()
        );
        Ok(EngineOutput { clip, observations })
    }

    fn overlap_seconds(&self) -> Option<f64> {
        Some(0.5)
    }
}

/// Parse SRT or WebVTT cues into word boundaries.
///
/// Cue numbers, headers and notes are skipped. Markup tags inside cue text are
/// removed. Cues with unreadable timestamps are dropped.
pub fn parse_subtitles(content: &str) -> Vec<WordBoundary> {
    let mut boundaries = Vec::new();
    let mut lines = content.lines().map(str::trim);

    while let Some(line) = lines.next() {
        let Some((start, end)) = line.split_once("-->") else {
            continue;
        };
        let start = parse_timestamp(start.trim());
        // VTT cue settings may follow the end timestamp.
        let end = end.split_whitespace().next().and_then(parse_timestamp);

        let mut words = Vec::new();
        for text_line in lines.by_ref() {
            if text_line.is_empty() {
                break;
            }
            words.push(strip_tags(text_line));
        }
        let text = words.join(" ");

        match (start, end) {
            (Some(start), Some(end)) if !text.trim().is_empty() => {
                boundaries.push(WordBoundary {
                    text: text.trim().to_string(),
                    offset: start,
                    duration: end.saturating_sub(start),
                });
            }
            _ => log::debug!("Skipping subtitle cue {line:?}"),
        }
    }

    boundaries
}

/// `HH:MM:SS,mmm`, `HH:MM:SS.mmm` or `MM:SS.mmm`.
fn parse_timestamp(raw: &str) -> Option<Duration> {
    let raw = raw.replace(',', ".");
    let parts: Vec<&str> = raw.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, *s),
        [m, s] => (0, m.parse::<u64>().ok()?, *s),
        _ => return None,
    };

    let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, "0"));
    let whole: u64 = whole.parse().ok()?;
    let digits: String = fraction.chars().take(3).collect();
    let millis = format!("{digits:0<3}").parse::<u64>().ok()?;

    Some(Duration::from_millis(
        ((hours * 60 + minutes) * 60 + whole) * 1000 + millis,
    ))
}

fn strip_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_tag = false;
    for ch in line.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_srt_word_cues() {
        let srt = "1\n00:00:00,100 --> 00:00:00,500\nHello\n\n2\n00:00:00,500 --> 00:00:01,250\nworld.\n";
        let cues = parse_subtitles(srt);
        assert_eq!(
            cues,
            vec![
                WordBoundary {
                    text: "Hello".to_string(),
                    offset: Duration::from_millis(100),
                    duration: Duration::from_millis(400),
                },
                WordBoundary {
                    text: "world.".to_string(),
                    offset: Duration::from_millis(500),
                    duration: Duration::from_millis(750),
                },
            ]
        );
    }

    #[test]
    fn parses_vtt_phrase_cues() {
        let vtt = "WEBVTT\n\n00:00.050 --> 00:01.500 align:start\nThe quick <b>brown</b>\nfox\n\n01:00:02.000 --> 01:00:02.400\njumps\n";
        let cues = parse_subtitles(vtt);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].text, "The quick brown fox");
        assert_eq!(cues[0].offset, Duration::from_millis(50));
        assert_eq!(cues[0].duration, Duration::from_millis(1450));
        assert_eq!(cues[1].offset, Duration::from_secs(3602));
    }

    #[test]
    fn skips_cues_with_bad_timestamps() {
        let srt = "1\nxx:00 --> 00:00:01,000\nbroken\n\n2\n00:00:01,000 --> 00:00:01,200\nok\n";
        let cues = parse_subtitles(srt);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "ok");
    }

    #[test]
    fn short_fractions_are_milliseconds() {
        assert_eq!(parse_timestamp("00:00:01.5"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_timestamp("garbage"), None);
    }

    #[test]
    fn missing_binary_is_dependency_error() {
        let mut engine = EdgeEngine::new("en-US-JennyNeural").with_binary("/nonexistent/edge-tts");
        assert!(matches!(
            engine.initialize(),
            Err(EngineError::DependencyMissing { .. })
        ));
    }
}
