//! Device-backed backend factory

use super::backend::{BackendFactory, BackendKind, PlaybackBackend};
use super::error::PlaybackError;
use super::native::PitchShiftBackend;
use super::streaming::StreamingBackend;
use crate::audio::AudioConfig;

/// Creates backends that play on a cpal output device
#[derive(Debug, Clone, Default)]
pub struct CpalBackendFactory {
    config: AudioConfig,
}

impl CpalBackendFactory {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }
}

impl BackendFactory for CpalBackendFactory {
    fn create(&self, kind: BackendKind) -> Result<Box<dyn PlaybackBackend>, PlaybackError> {
        let backend: Box<dyn PlaybackBackend> = match kind {
            BackendKind::Native => Box::new(PitchShiftBackend::start(&self.config)?),
            BackendKind::Fallback => Box::new(StreamingBackend::start(&self.config)?),
        };
        Ok(backend)
    }
}
