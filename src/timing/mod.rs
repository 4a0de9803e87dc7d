//! Word-level timing calculation.
//!
//! Engines report timing in whatever shape they have: word-boundary events,
//! word spans aggregated from phoneme durations, or nothing at all. The
//! [`TimingCalculator`] turns any of these into one [`CanonicalWordTiming`] per
//! source token such that:
//!
//! - every token index `0..N` appears exactly once, in order;
//! - `start <= end` for every word;
//! - each word ends exactly where the next one starts;
//! - the last word ends at the clip's total duration.
//!
//! Noisy or misaligned engine output never aborts the calculation. Affected
//! tokens are estimated from their neighbors and the problem is recorded as an
//! [`AlignmentIssue`] on the resulting [`WordTimeline`].

mod align;
mod continuity;
pub mod estimate;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::AudioClip;
use crate::config::TimingConfig;
use crate::error::{ProbeError, TimingError};
use crate::text::SourceText;

/// A timed text segment exactly as an engine reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTimingObservation {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl RawTimingObservation {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }
}

/// An engine-native word boundary event: where a word starts and how long it
/// is spoken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordBoundary {
    pub text: String,
    pub offset: Duration,
    pub duration: Duration,
}

impl WordBoundary {
    pub fn into_observation(self) -> RawTimingObservation {
        let start = self.offset.as_secs_f64();
        let end = (self.offset + self.duration).as_secs_f64();
        RawTimingObservation {
            text: self.text,
            start,
            end,
        }
    }
}

/// Timing of one source token, in seconds at 1x speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CanonicalWordTiming {
    pub word_index: usize,
    pub start: f64,
    pub end: f64,
}

/// Where a timeline's timings came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimingSource {
    /// Every spoken token was matched to engine timing.
    Engine,
    /// Engine timing with some tokens estimated from their neighbors.
    PartiallyEstimated,
    /// Uniform estimation from the duration alone.
    Estimated,
}

/// A recovered alignment problem. Never fatal.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AlignmentIssue {
    #[error("alignment ambiguous: word {word_index} ({word:?}) had no engine timing")]
    Unmatched { word_index: usize, word: String },

    #[error("alignment ambiguous: engine segment {segment:?} matched no word")]
    ExtraSpeech { segment: String },

    #[error("alignment ambiguous: segment {segment:?} at {start:.3}s is out of order")]
    OutOfOrder { segment: String, start: f64 },

    #[error("alignment ambiguous: segment {segment:?} has a non-finite span")]
    InvalidSpan { segment: String },
}

/// Canonical timings for one synthesis unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordTimeline {
    pub timings: Vec<CanonicalWordTiming>,
    /// Length of the clip in seconds. The last word ends here.
    pub total_duration: f64,
    /// End of the last engine-reported segment, or the total duration when
    /// timings were estimated.
    pub speech_duration: f64,
    pub source: TimingSource,
    #[serde(skip)]
    pub issues: Vec<AlignmentIssue>,
}

impl WordTimeline {
    /// Index of the word being spoken `elapsed` seconds into the clip.
    ///
    /// `None` before the first word starts or when there are no words. Past
    /// the end this keeps returning the last word.
    pub fn word_at(&self, elapsed: f64) -> Option<usize> {
        let after = self.timings.partition_point(|t| t.start <= elapsed);
        after.checked_sub(1).map(|i| self.timings[i].word_index)
    }

    /// Check every canonical invariant against a source of `word_count` words.
    pub fn validate(&self, word_count: usize) -> Result<(), String> {
        if self.timings.len() != word_count {
            return Err(format!(
                "expected {word_count} timings, found {}",
                self.timings.len()
            ));
        }
        if !self.total_duration.is_finite() || self.total_duration < 0.0 {
            return Err(format!("invalid total duration {}", self.total_duration));
        }
        for (i, t) in self.timings.iter().enumerate() {
            if t.word_index != i {
                return Err(format!("timing {i} has word index {}", t.word_index));
            }
            if t.start > t.end {
                return Err(format!("word {i} starts after it ends"));
            }
        }
        if let Some(first) = self.timings.first() {
            if first.start < 0.0 {
                return Err("first word starts before 0".to_string());
            }
        }
        for pair in self.timings.windows(2) {
            if pair[0].end != pair[1].start {
                return Err(format!(
                    "gap or overlap between words {} and {}",
                    pair[0].word_index, pair[1].word_index
                ));
            }
        }
        if let Some(last) = self.timings.last() {
            if last.end != self.total_duration {
                return Err(format!(
                    "last word ends at {} but clip lasts {}",
                    last.end, self.total_duration
                ));
            }
        }
        Ok(())
    }
}

/// A synthesized unit ready for playback.
#[derive(Debug)]
pub struct SynthesisResult {
    pub clip: AudioClip,
    pub text: SourceText,
    pub timeline: WordTimeline,
}

impl SynthesisResult {
    pub fn total_duration(&self) -> f64 {
        self.timeline.total_duration
    }

    pub fn timings(&self) -> &[CanonicalWordTiming] {
        &self.timeline.timings
    }
}

/// Normalizes raw engine timing into a [`WordTimeline`].
///
/// Pure and synchronous. The only outside input is the duration callback,
/// which is invoked lazily and at most once, when the observations cannot
/// supply a total duration.
#[derive(Debug, Clone, Default)]
pub struct TimingCalculator {
    config: TimingConfig,
}

impl TimingCalculator {
    pub fn new(config: TimingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    /// Build the canonical timeline for `text`.
    ///
    /// # Arguments
    /// - `text`: the tokenized unit that was synthesized
    /// - `observations`: engine timing in emission order, possibly empty
    /// - `probe_duration`: returns the clip's duration; called only when the
    ///   observations have no usable end time
    pub fn calculate<F>(
        &self,
        text: &SourceText,
        observations: &[RawTimingObservation],
        probe_duration: F,
    ) -> Result<WordTimeline, TimingError>
    where
        F: FnOnce() -> Result<f64, ProbeError>,
    {
        let word_count = text.len();
        let mut issues = Vec::new();
        let kept = align::sanitize(observations, &mut issues);

        let timeline = if kept.is_empty() {
            let total = self.resolve_duration(word_count, None, probe_duration)?;
            WordTimeline {
                timings: estimate::uniform(word_count, total),
                total_duration: total,
                speech_duration: total,
                source: TimingSource::Estimated,
                issues,
            }
        } else {
            let observed_end = kept.iter().map(|o| o.end).fold(0.0, f64::max);
            let total = self.resolve_duration(word_count, Some(observed_end), probe_duration)?;

            let pieces = align::split_into_pieces(&kept, self.config.split_rule);
            let spans = align::align(text.tokens(), &pieces, &self.config, &mut issues);
            let matched = spans.iter().filter(|s| s.is_some()).count();
            let spoken = text
                .words()
                .filter(|w| !crate::text::normalize(w).is_empty())
                .count();

            let starts = estimate::fill_unmatched(&spans, total);
            let source = if matched == 0 && word_count > 0 {
                TimingSource::Estimated
            } else if matched < spoken {
                TimingSource::PartiallyEstimated
            } else {
                TimingSource::Engine
            };

            WordTimeline {
                timings: continuity::enforce(&starts, total),
                total_duration: total,
                speech_duration: observed_end.min(total),
                source,
                issues,
            }
        };

        for issue in &timeline.issues {
            log::warn!("{issue}");
        }
        debug_assert_eq!(timeline.validate(word_count), Ok(()));

        Ok(timeline)
    }

    /// Whether `calculate` would consult the probe for these observations.
    ///
    /// Lets callers probe ahead of time, off the thread that runs the
    /// calculation.
    pub fn needs_duration(&self, observations: &[RawTimingObservation]) -> bool {
        let kept = align::sanitize(observations, &mut Vec::new());
        !is_usable(kept.iter().map(|o| o.end).fold(0.0, f64::max))
    }

    /// Total duration from the observations, the probe, or the word count,
    /// in that order.
    fn resolve_duration<F>(
        &self,
        word_count: usize,
        observed: Option<f64>,
        probe_duration: F,
    ) -> Result<f64, TimingError>
    where
        F: FnOnce() -> Result<f64, ProbeError>,
    {
        if let Some(end) = observed.filter(|d| is_usable(*d)) {
            return Ok(end);
        }

        match probe_duration() {
            Ok(duration) if is_usable(duration) => return Ok(duration),
            Ok(duration) => log::warn!("Probe returned unusable duration {duration}"),
            Err(e) => log::warn!("Duration probe failed, estimating from word count: {e}"),
        }

        if word_count == 0 {
            return Ok(0.0);
        }

        let estimated = word_count as f64 * self.config.seconds_per_word;
        if is_usable(estimated) {
            log::debug!("Estimated {estimated:.3}s for {word_count} words");
            Ok(estimated)
        } else {
            Err(TimingError::InvariantViolation {
                words: word_count,
                reason: format!(
                    "probe failed and seconds_per_word {} gives no usable estimate",
                    self.config.seconds_per_word
                ),
            })
        }
    }
}

fn is_usable(duration: f64) -> bool {
    duration.is_finite() && duration > 0.0
}
