//! Playback error types

use thiserror::Error;

use super::backend::BackendKind;
use crate::audio::AudioError;
use crate::audio_file::DecodeError;

/// Errors raised by the playback engine and its backends
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Neither backend could be set up
    #[error("No playback backend could be initialized (native: {native}; fallback: {fallback})")]
    InitializationFailure { native: String, fallback: String },

    /// Track could not be loaded even after falling back
    #[error("Failed to load {url} (native: {native}; fallback: {fallback})")]
    LoadFailure {
        url: String,
        native: String,
        fallback: String,
    },

    /// A specific backend failed to start or is missing
    #[error("{kind} backend unavailable: {reason}")]
    BackendUnavailable { kind: BackendKind, reason: String },

    /// Seek could not be delivered; playback continues where it was
    #[error("Seek failed: {0}")]
    TransientSeekFailure(String),

    /// Operation needs a loaded track
    #[error("No track loaded")]
    NotLoaded,

    /// `initialize` was never called
    #[error("Playback engine not initialized")]
    NotInitialized,

    /// A retried load failed; the engine must be recreated
    #[error("Playback engine is in a terminal error state")]
    Terminal,

    /// `retry` called with no failed load pending
    #[error("No failed load to retry")]
    NothingToRetry,

    /// Transport command queue to the audio thread is full
    #[error("Transport command queue is full")]
    CommandQueueFull,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Audio(#[from] AudioError),
}
