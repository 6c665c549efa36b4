//! Playback backend abstraction
//!
//! The engine drives two interchangeable backends through
//! [`PlaybackBackend`]. Backends are created by an injected
//! [`BackendFactory`] so sessions can run against real devices or test
//! doubles.

use serde::{Deserialize, Serialize};

use super::error::PlaybackError;

/// Which backend is playing the track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Pitch-shifting engine with internal A-B wrap
    Native,
    /// Plain streaming player, no pitch shift, software looping
    Fallback,
}

impl BackendKind {
    pub fn supports_pitch_shift(self) -> bool {
        match self {
            BackendKind::Native => true,
            BackendKind::Fallback => false,
        }
    }

    pub fn supports_native_loop(self) -> bool {
        match self {
            BackendKind::Native => true,
            BackendKind::Fallback => false,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Native => write!(f, "native"),
            BackendKind::Fallback => write!(f, "fallback"),
        }
    }
}

/// A playback implementation (device stream, decoder, transport)
///
/// Positions are in seconds. Implementations do not clamp; the engine clamps
/// before calling [`seek`](Self::seek).
pub trait PlaybackBackend {
    fn kind(&self) -> BackendKind;

    /// Load a track; returns its duration in seconds
    fn load(&mut self, url: &str) -> Result<f64, PlaybackError>;

    /// Drop the current track
    fn unload(&mut self);

    fn play(&mut self) -> Result<(), PlaybackError>;

    fn pause(&mut self) -> Result<(), PlaybackError>;

    fn seek(&mut self, position: f64) -> Result<(), PlaybackError>;

    /// Transpose in semitones; backends without pitch shifting ignore it
    fn set_pitch(&mut self, _semitones: f64) -> Result<(), PlaybackError> {
        Ok(())
    }

    /// Hand loop bounds to the backend
    ///
    /// Returns `Ok(true)` if the backend wraps internally.
    fn set_loop_bounds(&mut self, _bounds: Option<(f64, f64)>) -> Result<bool, PlaybackError> {
        Ok(false)
    }

    /// Internal loop wraps since the track was loaded
    fn loop_wrap_count(&self) -> u64 {
        0
    }

    fn position(&self) -> f64;

    fn duration(&self) -> Option<f64>;

    fn is_playing(&self) -> bool;
}

/// Creates backends on demand
pub trait BackendFactory {
    fn create(&self, kind: BackendKind) -> Result<Box<dyn PlaybackBackend>, PlaybackError>;
}
