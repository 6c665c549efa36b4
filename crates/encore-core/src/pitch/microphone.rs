//! Microphone access for pitch analysis
//!
//! The analysis engine talks to a [`Microphone`] through a
//! [`MicrophoneLease`]. The lease releases the device when it is dropped or
//! returned, so every exit path releases exactly once.

use std::time::Duration;

use super::detector::PitchDetector;
use super::error::AnalysisError;
use crate::audio::{has_device, start_input, AudioConfig, Direction, InputHandle};
use crate::config::AnalysisConfig;

/// One frequency estimate from the microphone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchSample {
    /// Hz
    pub frequency: f64,
    /// 0..1
    pub confidence: f64,
    /// Session clock time of the capture
    pub timestamp: Duration,
}

/// A pitch-capable microphone
pub trait Microphone {
    /// Ask for access; false when denied
    fn request_permission(&mut self) -> bool;

    /// Start capturing
    fn open(&mut self) -> Result<(), AnalysisError>;

    /// Estimate the current pitch
    ///
    /// `Ok(None)` means no usable estimate yet (silence, not enough audio).
    fn capture(&mut self, now: Duration) -> Result<Option<PitchSample>, AnalysisError>;

    /// Stop capturing and free the device
    fn release(&mut self);
}

/// Exclusive, self-releasing hold on a microphone
pub struct MicrophoneLease {
    microphone: Option<Box<dyn Microphone>>,
}

impl MicrophoneLease {
    /// Open `microphone` and lease it
    ///
    /// On failure the microphone is handed back untouched.
    pub fn acquire(
        mut microphone: Box<dyn Microphone>,
    ) -> Result<Self, (Box<dyn Microphone>, AnalysisError)> {
        if !microphone.request_permission() {
            return Err((microphone, AnalysisError::PermissionDenied));
        }
        if let Err(e) = microphone.open() {
            microphone.release();
            return Err((microphone, e));
        }
        Ok(Self {
            microphone: Some(microphone),
        })
    }

    pub fn capture(&mut self, now: Duration) -> Result<Option<PitchSample>, AnalysisError> {
        match self.microphone.as_mut() {
            Some(microphone) => microphone.capture(now),
            None => Ok(None),
        }
    }

    /// Release the device and get the microphone back for a later lease
    pub fn release(mut self) -> Option<Box<dyn Microphone>> {
        let mut microphone = self.microphone.take()?;
        microphone.release();
        Some(microphone)
    }
}

impl Drop for MicrophoneLease {
    fn drop(&mut self) {
        if let Some(mut microphone) = self.microphone.take() {
            microphone.release();
        }
    }
}

/// Default input device with autocorrelation pitch detection
pub struct CpalMicrophone {
    audio: AudioConfig,
    enabled: bool,
    min_frequency: f64,
    max_frequency: f64,
    window_size: usize,
    input: Option<InputHandle>,
    detector: Option<PitchDetector>,
    /// Most recent samples, at most one detector window plus one drain
    window: Vec<f32>,
}

impl CpalMicrophone {
    pub fn new(audio: AudioConfig, analysis: &AnalysisConfig) -> Self {
        Self {
            audio,
            enabled: analysis.microphone_enabled,
            min_frequency: analysis.min_frequency,
            max_frequency: analysis.max_frequency,
            window_size: analysis.window_size,
            input: None,
            detector: None,
            window: Vec::new(),
        }
    }
}

impl Microphone for CpalMicrophone {
    fn request_permission(&mut self) -> bool {
        if !self.enabled {
            log::info!("Microphone disabled by configuration");
            return false;
        }
        has_device(self.audio.input_device.as_ref(), Direction::Input)
    }

    fn open(&mut self) -> Result<(), AnalysisError> {
        let input = start_input(&self.audio)?;
        let detector = PitchDetector::new(
            input.sample_rate(),
            self.min_frequency,
            self.max_frequency,
            self.window_size,
        );
        self.window = Vec::with_capacity(detector.window_size() * 2);
        self.detector = Some(detector);
        self.input = Some(input);
        Ok(())
    }

    fn capture(&mut self, now: Duration) -> Result<Option<PitchSample>, AnalysisError> {
        let (Some(input), Some(detector)) = (self.input.as_mut(), self.detector.as_mut()) else {
            return Ok(None);
        };
        if input.has_failed() {
            return Err(AnalysisError::AnalysisInterrupted(
                "input stream reported an error".to_string(),
            ));
        }

        input.drain_into(&mut self.window);
        let keep = detector.window_size();
        if self.window.len() > keep {
            self.window.drain(..self.window.len() - keep);
        }

        Ok(detector.detect(&self.window).map(|estimate| PitchSample {
            frequency: estimate.frequency,
            confidence: estimate.clarity,
            timestamp: now,
        }))
    }

    fn release(&mut self) {
        if self.input.take().is_some() {
            log::info!("Microphone released");
        }
        self.detector = None;
        self.window.clear();
    }
}
