//! Pitch-shifting backend
//!
//! Renders the decoded track through signalsmith-stretch on the device
//! thread. Supports transposition and wraps A-B loops internally, so the
//! software loop controller stays idle while this backend plays.

use std::sync::Arc;

use super::backend::{BackendKind, PlaybackBackend};
use super::command::{command_channel, TransportCommand};
use super::error::PlaybackError;
use super::renderer::{TrackRenderer, TransportAtomics};
use super::transport::Transport;
use crate::audio::{start_output, AudioConfig, AudioSource, OutputHandle, MAX_BUFFER_SIZE};
use crate::timestretch::{clamp_semitones, PitchShifter};
use crate::types::StereoBuffer;

/// Device-thread state of the pitch-shifting backend
struct PitchShiftSource {
    renderer: TrackRenderer,
    shifter: PitchShifter,
    commands: rtrb::Consumer<TransportCommand>,
    /// Unshifted render, pre-allocated
    scratch: StereoBuffer,
}

impl PitchShiftSource {
    fn new(
        sample_rate: u32,
        commands: rtrb::Consumer<TransportCommand>,
        atomics: Arc<TransportAtomics>,
    ) -> Self {
        Self {
            renderer: TrackRenderer::new(sample_rate, atomics),
            shifter: PitchShifter::new_with_sample_rate(sample_rate),
            commands,
            scratch: StereoBuffer::silence(MAX_BUFFER_SIZE),
        }
    }
}

impl AudioSource for PitchShiftSource {
    fn render(&mut self, output: &mut StereoBuffer) {
        while let Ok(command) = self.commands.pop() {
            match command {
                TransportCommand::SetPitch(semitones) => self.shifter.set_semitones(semitones),
                other => self.renderer.apply(other),
            }
        }

        if !self.shifter.is_active() {
            self.renderer.render(output);
            return;
        }

        self.scratch.set_len_from_capacity(output.len());
        self.scratch.fill_silence();
        self.renderer.render(&mut self.scratch);
        if self.renderer.take_discontinuity() {
            self.shifter.reset();
        }
        self.shifter.process(&self.scratch, output);
    }
}

/// Native backend: pitch shift plus internal loop wrap
pub struct PitchShiftBackend {
    transport: Transport,
    pitch: f64,
    _output: OutputHandle,
}

impl PitchShiftBackend {
    /// Open the output device and start the (silent) stream
    pub fn start(config: &AudioConfig) -> Result<Self, PlaybackError> {
        let (tx, rx) = command_channel();
        let atomics = Arc::new(TransportAtomics::new());
        let source_atomics = atomics.clone();

        let output = start_output(config, move |sample_rate| {
            PitchShiftSource::new(sample_rate, rx, source_atomics)
        })?;
        log::info!(
            "Pitch-shift backend ready ({}Hz, ~{:.1}ms)",
            output.sample_rate(),
            output.latency_ms()
        );

        Ok(Self {
            transport: Transport::new(tx, atomics),
            pitch: 0.0,
            _output: output,
        })
    }
}

impl PlaybackBackend for PitchShiftBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn load(&mut self, url: &str) -> Result<f64, PlaybackError> {
        let duration = self.transport.load(url)?;
        self.transport.set_pitch(self.pitch)?;
        Ok(duration)
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

    fn set_pitch(&mut self, semitones: f64) -> Result<(), PlaybackError> {
        self.pitch = clamp_semitones(semitones);
        self.transport.set_pitch(self.pitch)
    }

    fn set_loop_bounds(&mut self, bounds: Option<(f64, f64)>) -> Result<bool, PlaybackError> {
        self.transport.set_loop(bounds)?;
        Ok(true)
    }

    fn loop_wrap_count(&self) -> u64 {
        self.transport.loop_wraps()
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
