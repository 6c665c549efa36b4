//! Streaming fallback backend
//!
//! Plays the decoded track as-is. There is no pitch shifting and no internal
//! loop; A-B loops run through the software loop controller.

use std::sync::Arc;

use super::backend::{BackendKind, PlaybackBackend};
use super::command::{command_channel, TransportCommand};
use super::error::PlaybackError;
use super::renderer::{TrackRenderer, TransportAtomics};
use super::transport::Transport;
use crate::audio::{start_output, AudioConfig, AudioSource, OutputHandle};
use crate::types::StereoBuffer;

struct StreamingSource {
    renderer: TrackRenderer,
    commands: rtrb::Consumer<TransportCommand>,
}

impl AudioSource for StreamingSource {
    fn render(&mut self, output: &mut StereoBuffer) {
        self.renderer.process_commands(&mut self.commands);
        self.renderer.render(output);
    }
}

/// Fallback backend
pub struct StreamingBackend {
    transport: Transport,
    _output: OutputHandle,
}

impl StreamingBackend {
    pub fn start(config: &AudioConfig) -> Result<Self, PlaybackError> {
        let (tx, rx) = command_channel();
        let atomics = Arc::new(TransportAtomics::new());
        let source_atomics = atomics.clone();

        let output = start_output(config, move |sample_rate| StreamingSource {
            renderer: TrackRenderer::new(sample_rate, source_atomics),
            commands: rx,
        })?;
        log::info!("Streaming backend ready ({}Hz)", output.sample_rate());

        Ok(Self {
            transport: Transport::new(tx, atomics),
            _output: output,
        })
    }
}

impl PlaybackBackend for StreamingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fallback
    }

    fn load(&mut self, url: &str) -> Result<f64, PlaybackError> {
        self.transport.load(url)
    }

    fn unload(&mut self) {
        self.transport.unload();
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        self.transport.play()
    }

    fn pause(&mut self) -> Result<(), PlaybackError> {
        self.transport.pause()
    }

    fn seek(&mut self, position: f64) -> Result<(), PlaybackError> {
        self.transport.seek(position)
    }

    fn position(&self) -> f64 {
        self.transport.position()
    }

    fn duration(&self) -> Option<f64> {
        self.transport.duration()
    }

    fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }
}
