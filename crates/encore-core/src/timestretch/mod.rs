//! Pitch shifting via signalsmith-stretch
//!
//! The native backend transposes the backing track into the singer's key
//! without changing tempo. Input and output blocks are always the same
//! length, so the stretcher only applies its transpose factor.

use signalsmith_stretch::Stretch;

use crate::types::{StereoBuffer, SAMPLE_RATE};

/// Number of channels (stereo)
const CHANNELS: u32 = 2;

/// Pitch shift range in semitones (one octave each way)
pub const MAX_PITCH_SEMITONES: f64 = 12.0;

/// Clamp a pitch shift into `-12..=12`, non-finite input becomes 0
pub fn clamp_semitones(semitones: f64) -> f64 {
    if semitones.is_finite() {
        semitones.clamp(-MAX_PITCH_SEMITONES, MAX_PITCH_SEMITONES)
    } else {
        0.0
    }
}

/// Tempo-preserving pitch shifter
///
/// Uses zero-copy format conversion: StereoBuffer is reinterpreted as
/// interleaved f32 without any per-frame copying.
pub struct PitchShifter {
    stretcher: Stretch,
    /// Pitch shift in semitones (positive = up, negative = down)
    semitones: f64,
}

impl PitchShifter {
    pub fn new_with_sample_rate(sample_rate: u32) -> Self {
        Self {
            stretcher: Stretch::preset_default(CHANNELS, sample_rate),
            semitones: 0.0,
        }
    }

    pub fn new() -> Self {
        Self::new_with_sample_rate(SAMPLE_RATE)
    }

    /// Set pitch shift in semitones, clamped to one octave
    pub fn set_semitones(&mut self, semitones: f64) {
        self.semitones = clamp_semitones(semitones);
        self.stretcher
            .set_transpose_factor_semitones(self.semitones as f32, None);
    }

    pub fn semitones(&self) -> f64 {
        self.semitones
    }

    /// Whether processing would change the signal
    pub fn is_active(&self) -> bool {
        self.semitones != 0.0
    }

    /// Total latency in samples
    pub fn latency(&self) -> usize {
        self.stretcher.input_latency() + self.stretcher.output_latency()
    }

    /// Drop buffered state (after a seek or loop wrap)
    pub fn reset(&mut self) {
        self.stretcher.reset();
    }

    /// Transpose `input` into `output` (equal lengths)
    pub fn process(&mut self, input: &StereoBuffer, output: &mut StereoBuffer) {
        let len = input.len().min(output.len());
        let output_interleaved = output.as_interleaved_mut();
        output_interleaved.fill(0.0);
        if len == 0 {
            return;
        }

        self.stretcher.process(
            &input.as_interleaved()[..len * 2],
            &mut output_interleaved[..len * 2],
        );
    }
}

impl Default for PitchShifter {
    fn default() -> Self {
        Self::new()
    }
}
