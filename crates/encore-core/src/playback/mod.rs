//! Dual-backend playback engine
//!
//! [`PlaybackEngine`] unifies the pitch-shifting backend and the streaming
//! fallback behind one play/pause/seek/pitch API. Loads try the native
//! backend first; a native failure is logged and the fallback takes over.
//! Only when both fail does the caller see a [`PlaybackError::LoadFailure`].
//!
//! ```text
//!  Uninitialized ──initialize──► Loading ──load ok──► Ready(kind) ◄──► Playing/Paused
//!                                  ▲  │
//!                                  └──┘ load failed (retry allowed)
//!                                     │
//!                                     └── retry failed ──► Error (terminal)
//! ```

mod backend;
mod command;
mod error;
mod factory;
mod native;
mod renderer;
mod streaming;
mod transport;

pub use backend::{BackendFactory, BackendKind, PlaybackBackend};
pub use command::{command_channel, TransportCommand, COMMAND_QUEUE_CAPACITY};
pub use error::PlaybackError;
pub use factory::CpalBackendFactory;
pub use native::PitchShiftBackend;
pub use renderer::{TrackRenderer, TransportAtomics};
pub use streaming::StreamingBackend;
pub use transport::Transport;

use serde::{Deserialize, Serialize};

use crate::timestretch::clamp_semitones;
use crate::types::secs_to_millis;

/// Engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No backends yet
    Uninitialized,
    /// Backends ready, no track (or the last load failed and may be retried)
    Loading,
    /// Track loaded, stopped at a position
    Ready(BackendKind),
    Playing(BackendKind),
    Paused(BackendKind),
    /// A retried load failed; nothing else is accepted
    Error,
}

impl EngineState {
    /// Backend that holds the loaded track
    pub fn backend(&self) -> Option<BackendKind> {
        match self {
            EngineState::Ready(kind) | EngineState::Playing(kind) | EngineState::Paused(kind) => {
                Some(*kind)
            }
            EngineState::Uninitialized | EngineState::Loading | EngineState::Error => None,
        }
    }
}

/// Status payload for playback status listeners
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStatus {
    pub is_loaded: bool,
    pub position_millis: u64,
    pub duration_millis: u64,
    pub is_playing: bool,
}

/// Snapshot of the loaded track's playback
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSession {
    pub backend: BackendKind,
    /// Seconds
    pub position: f64,
    /// Seconds
    pub duration: f64,
    pub is_playing: bool,
    /// A loop seek is in flight or cooling down
    pub is_jumping: bool,
}

/// Playback engine over two backends
pub struct PlaybackEngine {
    state: EngineState,
    native: Option<Box<dyn PlaybackBackend>>,
    fallback: Option<Box<dyn PlaybackBackend>>,
    prefer_native: bool,
    pitch: f64,
    url: Option<String>,
    /// URL of the last failed load, consumed by `retry`
    failed_url: Option<String>,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        Self {
            state: EngineState::Uninitialized,
            native: None,
            fallback: None,
            prefer_native: true,
            pitch: 0.0,
            url: None,
            failed_url: None,
        }
    }

    /// Skip the native backend entirely (configuration switch)
    pub fn with_prefer_native(mut self, prefer_native: bool) -> Self {
        self.prefer_native = prefer_native;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Create both backends
    ///
    /// A backend that fails is logged and skipped; fails only if neither
    /// could be created.
    pub fn initialize(&mut self, factory: &dyn BackendFactory) -> Result<(), PlaybackError> {
        let native = if self.prefer_native {
            factory.create(BackendKind::Native)
        } else {
            Err(PlaybackError::BackendUnavailable {
                kind: BackendKind::Native,
                reason: "disabled by configuration".to_string(),
            })
        };
        let fallback = factory.create(BackendKind::Fallback);

        let native_reason = native.as_ref().err().map(|e| e.to_string());
        let fallback_reason = fallback.as_ref().err().map(|e| e.to_string());

        self.native = native.ok();
        self.fallback = fallback.ok();

        if let Some(reason) = &native_reason {
            log::warn!("Native playback backend unavailable: {}", reason);
        }
        if let Some(reason) = &fallback_reason {
            log::warn!("Fallback playback backend unavailable: {}", reason);
        }

        if self.native.is_none() && self.fallback.is_none() {
            self.state = EngineState::Uninitialized;
            return Err(PlaybackError::InitializationFailure {
                native: native_reason.unwrap_or_default(),
                fallback: fallback_reason.unwrap_or_default(),
            });
        }

        log::info!(
            "Playback engine initialized (native: {}, fallback: {})",
            self.native.is_some(),
            self.fallback.is_some()
        );
        self.state = EngineState::Loading;
        Ok(())
    }

    /// Load a track, native backend first
    pub fn load(&mut self, url: &str) -> Result<BackendKind, PlaybackError> {
        self.check_usable()?;
        self.unload_active();
        self.state = EngineState::Loading;

        match self.try_load(url) {
            Ok(kind) => {
                self.failed_url = None;
                Ok(kind)
            }
            Err(e) => {
                log::error!("Track load failed: {}", e);
                self.failed_url = Some(url.to_string());
                Err(e)
            }
        }
    }

    /// Re-run the last failed load; a second failure is terminal
    pub fn retry(&mut self) -> Result<BackendKind, PlaybackError> {
        self.check_usable()?;
        let url = self.failed_url.take().ok_or(PlaybackError::NothingToRetry)?;
        log::info!("Retrying load of {}", url);

        match self.try_load(&url) {
            Ok(kind) => Ok(kind),
            Err(e) => {
                log::error!("Retry failed, playback engine entering error state: {}", e);
                self.state = EngineState::Error;
                Err(e)
            }
        }
    }

    fn try_load(&mut self, url: &str) -> Result<BackendKind, PlaybackError> {
        let mut native_reason = "unavailable".to_string();

        if let Some(native) = self.native.as_mut() {
            match native.load(url) {
                Ok(duration) => {
                    if let Err(e) = native.set_pitch(self.pitch) {
                        log::warn!("Failed to apply pitch {} on load: {}", self.pitch, e);
                    }
                    return Ok(self.loaded(BackendKind::Native, url, duration));
                }
                Err(e) => {
                    log::warn!("Native backend failed to load {}: {}; falling back", url, e);
                    native_reason = e.to_string();
                }
            }
        }

        let fallback_reason = match self.fallback.as_mut() {
            Some(fallback) => match fallback.load(url) {
                Ok(duration) => return Ok(self.loaded(BackendKind::Fallback, url, duration)),
                Err(e) => e.to_string(),
            },
            None => "unavailable".to_string(),
        };

        Err(PlaybackError::LoadFailure {
            url: url.to_string(),
            native: native_reason,
            fallback: fallback_reason,
        })
    }

    fn loaded(&mut self, kind: BackendKind, url: &str, duration: f64) -> BackendKind {
        log::info!("Loaded {} on {} backend ({:.1}s)", url, kind, duration);
        self.url = Some(url.to_string());
        self.state = EngineState::Ready(kind);
        kind
    }

    pub fn play(&mut self) -> Result<(), PlaybackError> {
        let kind = self.loaded_kind()?;
        self.active_mut()?.play()?;
        self.state = EngineState::Playing(kind);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        let kind = self.loaded_kind()?;
        self.active_mut()?.pause()?;
        self.state = EngineState::Paused(kind);
        Ok(())
    }

    /// Seek, clamped into `[0, duration]`; returns the applied position
    ///
    /// A backend seek failure is logged and swallowed; playback continues.
    pub fn seek(&mut self, position: f64) -> Result<f64, PlaybackError> {
        self.loaded_kind()?;
        let duration = self.duration().unwrap_or(0.0);
        let target = if position.is_finite() {
            position.clamp(0.0, duration)
        } else {
            0.0
        };

        if let Err(e) = self.active_mut()?.seek(target) {
            log::warn!("Transient seek failure at {:.3}s: {}", target, e);
        }
        Ok(target)
    }

    /// Set transposition (clamped to one octave); returns the stored value
    ///
    /// Only the native backend applies it. The value is kept and applied to
    /// later native loads.
    pub fn set_pitch(&mut self, semitones: f64) -> Result<f64, PlaybackError> {
        self.check_usable()?;
        self.pitch = clamp_semitones(semitones);
        if self.state.backend() == Some(BackendKind::Native) {
            let pitch = self.pitch;
            self.active_mut()?.set_pitch(pitch)?;
        }
        Ok(self.pitch)
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    /// Whether the active backend can transpose
    pub fn supports_pitch_shift(&self) -> bool {
        self.state.backend().is_some_and(BackendKind::supports_pitch_shift)
    }

    /// Pass loop bounds to the active backend
    ///
    /// Returns true if the backend wraps the loop itself.
    pub fn set_loop_bounds(&mut self, bounds: Option<(f64, f64)>) -> Result<bool, PlaybackError> {
        self.loaded_kind()?;
        self.active_mut()?.set_loop_bounds(bounds)
    }

    pub fn loop_wrap_count(&self) -> u64 {
        self.active().map(|b| b.loop_wrap_count()).unwrap_or(0)
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.state.backend()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn position(&self) -> f64 {
        self.active().map(|b| b.position()).unwrap_or(0.0)
    }

    pub fn duration(&self) -> Option<f64> {
        self.active().and_then(|b| b.duration())
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, EngineState::Playing(_)) && self.active().is_some_and(|b| b.is_playing())
    }

    pub fn status(&self) -> PlaybackStatus {
        match self.active() {
            Some(_) => PlaybackStatus {
                is_loaded: true,
                position_millis: secs_to_millis(self.position()),
                duration_millis: secs_to_millis(self.duration().unwrap_or(0.0)),
                is_playing: self.is_playing(),
            },
            None => PlaybackStatus::default(),
        }
    }

    /// Snapshot of the loaded track, `None` when nothing is loaded
    pub fn session(&self, is_jumping: bool) -> Option<PlaybackSession> {
        let backend = self.state.backend()?;
        Some(PlaybackSession {
            backend,
            position: self.position(),
            duration: self.duration().unwrap_or(0.0),
            is_playing: self.is_playing(),
            is_jumping,
        })
    }

    fn check_usable(&self) -> Result<(), PlaybackError> {
        match self.state {
            EngineState::Uninitialized => Err(PlaybackError::NotInitialized),
            EngineState::Error => Err(PlaybackError::Terminal),
            _ => Ok(()),
        }
    }

    fn loaded_kind(&self) -> Result<BackendKind, PlaybackError> {
        self.check_usable()?;
        self.state.backend().ok_or(PlaybackError::NotLoaded)
    }

    fn active(&self) -> Option<&dyn PlaybackBackend> {
        match self.state.backend()? {
            BackendKind::Native => self.native.as_deref(),
            BackendKind::Fallback => self.fallback.as_deref(),
        }
    }

    fn active_mut(&mut self) -> Result<&mut (dyn PlaybackBackend + 'static), PlaybackError> {
        let backend = match self.state.backend().ok_or(PlaybackError::NotLoaded)? {
            BackendKind::Native => self.native.as_deref_mut(),
            BackendKind::Fallback => self.fallback.as_deref_mut(),
        };
        backend.ok_or(PlaybackError::NotLoaded)
    }

    fn unload_active(&mut self) {
        if let Ok(backend) = self.active_mut() {
            backend.unload();
        }
        self.url = None;
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.unload_active();
    }
}
