//! Metronome - beat clock for practice sessions
//!
//! An approximation driven by the session scheduler, not sample-locked to
//! the audio clock. The scheduler fires [`MetronomeEngine::on_beat`] every
//! [`MetronomeEngine::interval`]; a loop seek-back calls
//! [`MetronomeEngine::reset`] so counting restarts on the loop's downbeat.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// BPM range accepted by the metronome
pub const MIN_BPM: f64 = 40.0;
pub const MAX_BPM: f64 = 240.0;
pub const DEFAULT_BPM: f64 = 120.0;

/// Time signature (beats per bar over beat unit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSignature {
    pub beats_per_bar: u8,
    pub beat_unit: u8,
}

impl TimeSignature {
    /// Create a time signature (beats per bar floored at 1)
    pub fn new(beats_per_bar: u8, beat_unit: u8) -> Self {
        Self {
            beats_per_bar: beats_per_bar.max(1),
            beat_unit,
        }
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats_per_bar: 4,
            beat_unit: 4,
        }
    }
}

impl std::fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.beats_per_bar, self.beat_unit)
    }
}

/// Snapshot of the metronome for display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetronomeState {
    pub bpm: f64,
    /// Beat within the bar (1-based), 0 before the first beat
    pub current_beat: u32,
    /// Beats emitted since the metronome was created
    pub total_beats: u64,
    pub time_signature: TimeSignature,
}

/// A single emitted beat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beat {
    /// Beat within the bar (1-based)
    pub beat_in_bar: u32,
    pub is_downbeat: bool,
    pub total_beats: u64,
}

/// Clamp a BPM value into the supported range
///
/// Non-finite input falls back to [`DEFAULT_BPM`].
pub fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_finite() {
        bpm.clamp(MIN_BPM, MAX_BPM)
    } else {
        DEFAULT_BPM
    }
}

/// Beat clock with bar counting
#[derive(Debug, Clone)]
pub struct MetronomeEngine {
    bpm: f64,
    current_beat: u32,
    total_beats: u64,
    time_signature: TimeSignature,
    running: bool,
}

impl MetronomeEngine {
    /// Create a stopped metronome
    pub fn new(bpm: f64, time_signature: TimeSignature) -> Self {
        Self {
            bpm: clamp_bpm(bpm),
            current_beat: 0,
            total_beats: 0,
            time_signature,
            running: false,
        }
    }

    /// Current tempo
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Set tempo (clamped to 40..240)
    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = clamp_bpm(bpm);
    }

    /// Time between beats: `60000 / bpm` ms
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.bpm)
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.time_signature = time_signature;
        self.current_beat = 0;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start counting from the first beat
    pub fn start(&mut self) {
        self.running = true;
        self.current_beat = 0;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Return to the first beat of the bar
    ///
    /// The next [`on_beat`](Self::on_beat) reports beat 1.
    pub fn reset(&mut self) {
        self.current_beat = 0;
    }

    /// Advance one beat
    ///
    /// Returns `None` while stopped.
    pub fn on_beat(&mut self) -> Option<Beat> {
        if !self.running {
            return None;
        }
        let beats_per_bar = self.time_signature.beats_per_bar.max(1) as u32;
        self.current_beat = self.current_beat % beats_per_bar + 1;
        self.total_beats += 1;

        Some(Beat {
            beat_in_bar: self.current_beat,
            is_downbeat: self.current_beat == 1,
            total_beats: self.total_beats,
        })
    }

    pub fn state(&self) -> MetronomeState {
        MetronomeState {
            bpm: self.bpm,
            current_beat: self.current_beat,
            total_beats: self.total_beats,
            time_signature: self.time_signature,
        }
    }
}

impl Default for MetronomeEngine {
    fn default() -> Self {
        Self::new(DEFAULT_BPM, TimeSignature::default())
    }
}
