//! Fundamental frequency estimation
//!
//! Normalized autocorrelation (NSDF) over a mono window:
//!
//! ```text
//! nsdf(τ) = 2 Σ x[i]·x[i+τ] / Σ (x[i]² + x[i+τ]²)
//! ```
//!
//! The first local maximum within 90% of the global maximum is taken as the
//! period, refined with parabolic interpolation. Its height (0..1) is the
//! clarity, reported as confidence.

/// Peaks below this fraction of the best peak are skipped
const PEAK_THRESHOLD: f32 = 0.9;

/// Windows quieter than this RMS are treated as silence
const SILENCE_RMS: f32 = 1e-3;

/// A frequency estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    pub frequency: f64,
    /// Clarity of the periodicity, 0..1
    pub clarity: f64,
}

/// Autocorrelation pitch detector restricted to a frequency range
#[derive(Debug, Clone)]
pub struct PitchDetector {
    sample_rate: u32,
    min_lag: usize,
    max_lag: usize,
    window_size: usize,
    nsdf: Vec<f32>,
}

impl PitchDetector {
    /// Create a detector for `min_frequency..=max_frequency` Hz
    pub fn new(sample_rate: u32, min_frequency: f64, max_frequency: f64, window_size: usize) -> Self {
        let sample_rate = sample_rate.max(1);
        let max_frequency = max_frequency.max(min_frequency + 1.0);
        let min_lag = ((sample_rate as f64 / max_frequency).floor() as usize).max(2);
        let max_lag = ((sample_rate as f64 / min_frequency.max(1.0)).ceil() as usize).max(min_lag + 2);
        // The window must hold at least two periods of the lowest pitch
        let window_size = window_size.max(max_lag * 2);

        Self {
            sample_rate,
            min_lag,
            max_lag,
            window_size,
            nsdf: vec![0.0; max_lag + 2],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples the detector reads from the end of its input
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Estimate the pitch of the most recent `window_size` samples
    pub fn detect(&mut self, samples: &[f32]) -> Option<PitchEstimate> {
        if samples.len() < self.window_size {
            return None;
        }
        let window = &samples[samples.len() - self.window_size..];

        let energy: f32 = window.iter().map(|s| s * s).sum();
        if (energy / window.len() as f32).sqrt() < SILENCE_RMS {
            return None;
        }

        let n = window.len();
        for lag in 0..=self.max_lag + 1 {
            let (mut acf, mut norm) = (0.0f32, 0.0f32);
            for i in 0..n - lag {
                let (a, b) = (window[i], window[i + lag]);
                acf += a * b;
                norm += a * a + b * b;
            }
            self.nsdf[lag] = if norm > 0.0 { 2.0 * acf / norm } else { 0.0 };
        }

        let is_peak = |lag: usize, nsdf: &[f32]| nsdf[lag] > nsdf[lag - 1] && nsdf[lag] >= nsdf[lag + 1];

        let best = (self.min_lag..=self.max_lag)
            .filter(|&lag| is_peak(lag, &self.nsdf))
            .map(|lag| self.nsdf[lag])
            .fold(f32::MIN, f32::max);
        if best <= 0.0 {
            return None;
        }

        let lag = (self.min_lag..=self.max_lag)
            .find(|&lag| is_peak(lag, &self.nsdf) && self.nsdf[lag] >= PEAK_THRESHOLD * best)?;

        let (y0, y1, y2) = (self.nsdf[lag - 1], self.nsdf[lag], self.nsdf[lag + 1]);
        let denom = y0 - 2.0 * y1 + y2;
        let (offset, peak) = if denom.abs() > f32::EPSILON {
            let offset = (0.5 * (y0 - y2) / denom).clamp(-0.5, 0.5);
            (offset, y1 - 0.25 * (y0 - y2) * offset)
        } else {
            (0.0, y1)
        };

        let period = lag as f64 + offset as f64;
        Some(PitchEstimate {
            frequency: self.sample_rate as f64 / period,
            clarity: (peak as f64).clamp(0.0, 1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    fn sine(frequency: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (TAU * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_detects_sine_frequencies() {
        let mut detector = PitchDetector::new(48000, 80.0, 1000.0, 2048);
        for freq in [110.0f32, 220.0, 440.0, 659.25] {
            let estimate = detector.detect(&sine(freq, 48000, 4096, 0.5)).unwrap();
            assert!(
                (estimate.frequency - freq as f64).abs() < freq as f64 * 0.005,
                "expected {freq}, got {}",
                estimate.frequency
            );
            assert!(estimate.clarity > 0.9);
        }
    }

    #[test]
    fn test_harmonic_rich_signal_picks_fundamental() {
        let a = sine(220.0, 48000, 4096, 0.5);
        let b = sine(440.0, 48000, 4096, 0.3);
        let signal: Vec<f32> = a.iter().zip(&b).map(|(x, y)| x + y).collect();

        let mut detector = PitchDetector::new(48000, 80.0, 1000.0, 2048);
        let estimate = detector.detect(&signal).unwrap();
        assert!((estimate.frequency - 220.0).abs() < 2.0, "got {}", estimate.frequency);
    }

    #[test]
    fn test_silence_and_short_input() {
        let mut detector = PitchDetector::new(48000, 80.0, 1000.0, 2048);
        assert!(detector.detect(&vec![0.0; 4096]).is_none());
        assert!(detector.detect(&sine(440.0, 48000, 100, 0.5)).is_none());
    }

    #[test]
    fn test_noise_has_low_clarity() {
        // Deterministic pseudo-random noise
        let mut state = 0x1234_5678u32;
        let noise: Vec<f32> = (0..4096)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state as f32 / u32::MAX as f32) - 0.5
            })
            .collect();

        let mut detector = PitchDetector::new(48000, 80.0, 1000.0, 2048);
        if let Some(estimate) = detector.detect(&noise) {
            assert!(estimate.clarity < 0.4, "clarity {}", estimate.clarity);
        }
    }

    #[test]
    fn test_window_grows_for_low_range() {
        let detector = PitchDetector::new(48000, 40.0, 1000.0, 512);
        assert!(detector.window_size() >= 2400);
    }
}
