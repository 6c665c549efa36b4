//! Music theory utilities for pitch scoring
//!
//! Converts notated pitches (step, alter, octave) to MIDI numbers and
//! equal-tempered frequencies, and measures intervals in cents.

use serde::{Deserialize, Serialize};

/// Concert pitch reference: A4 = MIDI 69 = 440 Hz
pub const A4_MIDI: i32 = 69;
pub const A4_FREQUENCY: f64 = 440.0;

/// Cents in one equal-tempered semitone
pub const CENTS_PER_SEMITONE: f64 = 100.0;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Diatonic step letter of a notated pitch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Step {
    /// Semitone offset from C within the octave
    pub const fn semitone(self) -> i32 {
        match self {
            Step::C => 0,
            Step::D => 2,
            Step::E => 4,
            Step::F => 5,
            Step::G => 7,
            Step::A => 9,
            Step::B => 11,
        }
    }
}

/// A notated pitch as it appears in lyric timing data
///
/// `alter` is the chromatic alteration in semitones (+1 sharp, -1 flat),
/// `octave` uses scientific pitch notation (C4 = middle C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePitch {
    pub step: Step,
    #[serde(default)]
    pub alter: i8,
    pub octave: i8,
}

impl NotePitch {
    /// Create a new notated pitch
    pub const fn new(step: Step, alter: i8, octave: i8) -> Self {
        Self { step, alter, octave }
    }

    /// MIDI note number: `(octave + 1) * 12 + step + alter`
    pub fn midi(&self) -> i32 {
        (self.octave as i32 + 1) * 12 + self.step.semitone() + self.alter as i32
    }

    /// Equal-tempered frequency in Hz (A4 = 440)
    pub fn frequency(&self) -> f64 {
        midi_to_frequency(self.midi() as f64)
    }

    /// Equal-tempered frequency in Hz against a custom A4 reference
    pub fn frequency_at(&self, reference_a4: f64) -> f64 {
        midi_to_frequency_at(self.midi() as f64, reference_a4)
    }
}

impl std::fmt::Display for NotePitch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", note_name(self.midi()))
    }
}

/// Equal-tempered frequency for a (possibly fractional) MIDI number
///
/// `f = 440 * 2^((n - 69) / 12)`
pub fn midi_to_frequency(midi: f64) -> f64 {
    midi_to_frequency_at(midi, A4_FREQUENCY)
}

/// [`midi_to_frequency`] with A4 tuned to `reference_a4` Hz
pub fn midi_to_frequency_at(midi: f64, reference_a4: f64) -> f64 {
    reference_a4 * 2f64.powf((midi - A4_MIDI as f64) / 12.0)
}

/// Fractional MIDI number for a frequency, `None` for non-positive input
pub fn frequency_to_midi(frequency: f64) -> Option<f64> {
    if !(frequency.is_finite() && frequency > 0.0) {
        return None;
    }
    Some(A4_MIDI as f64 + 12.0 * (frequency / A4_FREQUENCY).log2())
}

/// Interval from `reference` to `frequency` in cents
///
/// Positive when `frequency` is sharp of `reference`.
/// `1200 * log2(frequency / reference)`
pub fn cents_between(frequency: f64, reference: f64) -> f64 {
    if frequency <= 0.0 || reference <= 0.0 {
        return 0.0;
    }
    1200.0 * (frequency / reference).log2()
}

/// Scientific pitch name for a MIDI number, normalized to sharps ("A#4")
pub fn note_name(midi: i32) -> String {
    let idx = midi.rem_euclid(12) as usize;
    let octave = midi.div_euclid(12) - 1;
    format!("{}{}", NOTE_NAMES[idx], octave)
}

/// Nearest note name for a frequency, `None` for non-positive input
pub fn nearest_note_name(frequency: f64) -> Option<String> {
    frequency_to_midi(frequency).map(|m| note_name(m.round() as i32))
}
