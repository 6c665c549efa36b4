//! Control-thread side of a rendered backend
//!
//! [`Transport`] owns the command producer and the shared atomics for one
//! output stream. It decodes tracks on the control thread, queues them to
//! the renderer and converts between seconds and track frames.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use super::command::TransportCommand;
use super::error::PlaybackError;
use super::renderer::TransportAtomics;
use crate::audio_file::{decode_url, DecodedTrack};
use crate::types::{frames_to_secs, secs_to_frames};

/// Loaded track bookkeeping
#[derive(Debug, Clone, Copy)]
struct TrackInfo {
    sample_rate: u32,
    frames: u64,
}

pub struct Transport {
    commands: rtrb::Producer<TransportCommand>,
    atomics: Arc<TransportAtomics>,
    track: Option<TrackInfo>,
    /// Playback requested by the control thread
    playing: bool,
}

impl Transport {
    pub fn new(commands: rtrb::Producer<TransportCommand>, atomics: Arc<TransportAtomics>) -> Self {
        Self {
            commands,
            atomics,
            track: None,
            playing: false,
        }
    }

    fn send(&mut self, command: TransportCommand) -> Result<(), PlaybackError> {
        self.commands.push(command).map_err(|e| match e {
            rtrb::PushError::Full(command) => {
                log::warn!("Transport queue full, dropped {:?}", command);
                PlaybackError::CommandQueueFull
            }
        })
    }

    /// Decode `url` and queue it; returns the duration in seconds
    pub fn load(&mut self, url: &str) -> Result<f64, PlaybackError> {
        let track = decode_url(url)?;
        self.load_decoded(track)
    }

    /// Queue an already decoded track
    pub fn load_decoded(&mut self, track: DecodedTrack) -> Result<f64, PlaybackError> {
        let info = TrackInfo {
            sample_rate: track.sample_rate,
            frames: track.frames(),
        };
        let duration = track.duration_secs();

        self.atomics.reset();
        self.send(TransportCommand::Load(Arc::new(track)))?;
        self.track = Some(info);
        self.playing = false;
        Ok(duration)
    }

    pub fn unload(&mut self) {
        if self.track.take().is_some() {
            self.playing = false;
            // A full queue here only delays silence until the next load
            let _ = self.send(TransportCommand::Unload);
        }
    }

    pub fn play(&mut self) -> Result<(), PlaybackError> {
        self.require_track()?;
        self.send(TransportCommand::Play)?;
        self.atomics.ended.store(false, Ordering::Relaxed);
        self.playing = true;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        self.require_track()?;
        self.send(TransportCommand::Pause)?;
        self.playing = false;
        Ok(())
    }

    /// Seek to `secs` (already clamped by the caller)
    pub fn seek(&mut self, secs: f64) -> Result<(), PlaybackError> {
        let info = self.require_track()?;
        let frame = secs_to_frames(secs, info.sample_rate).min(info.frames);
        self.send(TransportCommand::Seek(frame))
            .map_err(|e| PlaybackError::TransientSeekFailure(e.to_string()))?;
        // Publish the target now so the next poll doesn't re-read the old position
        self.atomics.position.store(frame, Ordering::Relaxed);
        self.atomics.ended.store(false, Ordering::Relaxed);
        Ok(())
    }

    pub fn set_loop(&mut self, bounds: Option<(f64, f64)>) -> Result<(), PlaybackError> {
        let info = self.require_track()?;
        let frames = bounds.map(|(a, b)| {
            (
                secs_to_frames(a, info.sample_rate),
                secs_to_frames(b, info.sample_rate),
            )
        });
        self.send(TransportCommand::SetLoop(frames))
    }

    pub fn set_pitch(&mut self, semitones: f64) -> Result<(), PlaybackError> {
        self.send(TransportCommand::SetPitch(semitones))
    }

    pub fn position(&self) -> f64 {
        match self.track {
            Some(info) => frames_to_secs(self.atomics.position().min(info.frames), info.sample_rate),
            None => 0.0,
        }
    }

    pub fn duration(&self) -> Option<f64> {
        self.track.map(|info| frames_to_secs(info.frames, info.sample_rate))
    }

    pub fn is_playing(&self) -> bool {
        self.playing && !self.atomics.has_ended()
    }

    pub fn loop_wraps(&self) -> u64 {
        self.atomics.loop_wraps()
    }

    fn require_track(&self) -> Result<TrackInfo, PlaybackError> {
        self.track.ok_or(PlaybackError::NotLoaded)
    }
}
