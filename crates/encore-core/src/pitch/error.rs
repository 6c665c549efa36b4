//! Pitch analysis error types

use thiserror::Error;

use crate::audio::AudioError;

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Microphone access refused; the caller may ask again
    #[error("Microphone permission denied")]
    PermissionDenied,

    /// Capture failed mid-session; analysis has been stopped
    #[error("Pitch analysis interrupted: {0}")]
    AnalysisInterrupted(String),

    /// Microphone is already leased to a running analysis
    #[error("Pitch analysis already running")]
    AlreadyRunning,

    /// Microphone could not be opened
    #[error("Failed to open microphone: {0}")]
    Device(#[from] AudioError),
}
