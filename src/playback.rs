//! Clock-driven word highlighting for one playing unit.
//!
//! The synchronizer never looks at the audio device. It is driven by the
//! caller's monotonic clock: `start` when audio begins, then `tick` as often as
//! the UI wants to refresh. Timings stay at 1x speed; the playback speed only
//! scales how fast the media position advances.

use std::time::Instant;

use crate::timing::{SynthesisResult, WordTimeline};

/// Event emitted to the UI on each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncEvent {
    /// Highlight `word_index`; `progress` is the fraction of the clip played.
    Highlight { word_index: usize, progress: f64 },
    /// The clip has played to its end. Emitted once.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Pending,
    Active,
    Paused,
    Finished,
}

/// Maps elapsed playback time to the word being spoken.
///
/// Owns the [`SynthesisResult`], so dropping the synchronizer before it
/// finishes also releases the clip.
#[derive(Debug)]
pub struct PlaybackSynchronizer {
    result: SynthesisResult,
    phase: PlaybackPhase,
    /// Media position accumulated before `anchor`.
    base_elapsed: f64,
    /// Wall-clock reference while active.
    anchor: Option<Instant>,
    speed: f64,
}

impl PlaybackSynchronizer {
    pub fn new(result: SynthesisResult) -> Self {
        Self {
            result,
            phase: PlaybackPhase::Pending,
            base_elapsed: 0.0,
            anchor: None,
            speed: 1.0,
        }
    }

    pub fn result(&self) -> &SynthesisResult {
        &self.result
    }

    pub fn into_result(self) -> SynthesisResult {
        self.result
    }

    pub fn timeline(&self) -> &WordTimeline {
        &self.result.timeline
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Begin playback at `now`. Ignored unless pending.
    pub fn start(&mut self, now: Instant) {
        if self.phase != PlaybackPhase::Pending {
            return;
        }
        self.anchor = Some(now);
        self.phase = PlaybackPhase::Active;
        log::debug!(
            "Playback started for {} ({:.2}s)",
            self.result.clip.path().display(),
            self.result.total_duration()
        );
    }

    /// Media position in seconds at `now`.
    pub fn elapsed(&self, now: Instant) -> f64 {
        match (self.phase, self.anchor) {
            (PlaybackPhase::Active, Some(anchor)) => {
                let wall = now.saturating_duration_since(anchor).as_secs_f64();
                self.base_elapsed + wall * self.speed
            }
            _ => self.base_elapsed,
        }
    }

    /// Word being spoken at `now`, if any.
    pub fn current_word(&self, now: Instant) -> Option<usize> {
        if self.phase == PlaybackPhase::Pending {
            return None;
        }
        self.timeline().word_at(self.elapsed(now))
    }

    /// Advance to `now` and report what the UI should show.
    ///
    /// Returns `None` while pending, before the first word starts, and after
    /// `Finished` has been emitted.
    pub fn tick(&mut self, now: Instant) -> Option<SyncEvent> {
        match self.phase {
            PlaybackPhase::Pending | PlaybackPhase::Finished => return None,
            PlaybackPhase::Active | PlaybackPhase::Paused => {}
        }

        let elapsed = self.elapsed(now);
        let total = self.result.total_duration();
        if elapsed >= total {
            self.base_elapsed = total;
            self.anchor = None;
            self.phase = PlaybackPhase::Finished;
            return Some(SyncEvent::Finished);
        }

        let word_index = self.timeline().word_at(elapsed)?;
        Some(SyncEvent::Highlight {
            word_index,
            progress: (elapsed / total).clamp(0.0, 1.0),
        })
    }

    /// Freeze the media position.
    pub fn pause(&mut self, now: Instant) {
        if self.phase != PlaybackPhase::Active {
            return;
        }
        self.base_elapsed = self.elapsed(now);
        self.anchor = None;
        self.phase = PlaybackPhase::Paused;
    }

    /// Continue from where `pause` froze the position.
    pub fn resume(&mut self, now: Instant) {
        if self.phase != PlaybackPhase::Paused {
            return;
        }
        self.anchor = Some(now);
        self.phase = PlaybackPhase::Active;
    }

    /// Change the playback speed without moving the current position.
    pub fn set_speed(&mut self, now: Instant, speed: f64) {
        if !speed.is_finite() || speed <= 0.0 {
            log::warn!("Ignoring invalid playback speed {speed}");
            return;
        }
        if self.phase == PlaybackPhase::Active {
            self.base_elapsed = self.elapsed(now);
            self.anchor = Some(now);
        }
        self.speed = speed;
    }

    /// Media position at which the next unit should start playing, given the
    /// overlap between consecutive units.
    pub fn handoff_at(&self, overlap: f64) -> f64 {
        (self.result.total_duration() - overlap).max(0.1)
    }

    /// Whether playback has reached [`handoff_at`](Self::handoff_at).
    pub fn should_hand_off(&self, now: Instant, overlap: f64) -> bool {
        match self.phase {
            PlaybackPhase::Pending => false,
            PlaybackPhase::Finished => true,
            PlaybackPhase::Active | PlaybackPhase::Paused => {
                self.elapsed(now) >= self.handoff_at(overlap)
            }
        }
    }
}
