//! A-B loop controller
//!
//! Holds the user's loop region and decides, on every position tick, whether
//! playback has run past point B and must jump back to point A.
//!
//! Two execution paths exist:
//! - **Native**: the pitch-shifting backend is told the bounds once and wraps
//!   internally without software polling ([`LoopMode::Native`]).
//! - **Software**: the fallback backend is polled; a jump is issued when a
//!   tick lands in `[B, duration)`. Overshoot past B is bounded by one poll
//!   interval times playback speed ([`max_loop_overshoot`]).
//!
//! Overlapping jumps are prevented by [`LoopGuard`], a small state machine
//! advanced with compare-and-set transitions:
//!
//! ```text
//!   Idle ──try_begin_jump──► Jumping ──seek_completed──► CoolingDown
//!    ▲                                                      │
//!    └────────────────── cooldown elapsed ──────────────────┘
//! ```
//!
//! The cooldown exists because the position poll (~100 ms) can report the
//! pre-seek position again before the backend visibly moves.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use thiserror::Error;

/// Default time after a completed seek before another jump may trigger
pub const DEFAULT_LOOP_COOLDOWN: Duration = Duration::from_millis(500);

/// A-B loop errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoopError {
    /// Rejected A/B input; the loop region is left unchanged
    #[error("Invalid loop range: {0}")]
    InvalidRange(String),
}

/// User-marked loop region
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopRegion {
    pub point_a: Option<f64>,
    pub point_b: Option<f64>,
    /// True only once both points are set
    pub enabled: bool,
    /// Point B was filled in from the track duration
    pub has_auto_set_b: bool,
}

impl LoopRegion {
    /// Both points when the loop is enabled
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match (self.enabled, self.point_a, self.point_b) {
            (true, Some(a), Some(b)) => Some((a, b)),
            _ => None,
        }
    }

    fn refresh_enabled(&mut self) {
        self.enabled = self.point_a.is_some() && self.point_b.is_some();
    }
}

/// How the loop wrap is performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Controller polls positions and issues seeks
    #[default]
    Software,
    /// Backend wraps internally; ticks never issue seeks
    Native,
}

/// Action requested by a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopAction {
    /// Seek playback to this position (seconds)
    SeekTo(f64),
}

/// Jump guard phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GuardPhase {
    Idle = 0,
    Jumping = 1,
    CoolingDown = 2,
}

impl GuardPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => GuardPhase::Jumping,
            2 => GuardPhase::CoolingDown,
            _ => GuardPhase::Idle,
        }
    }
}

/// Reentrancy guard for loop seeks
///
/// Every transition is a single compare-and-set, so a transition only
/// happens from the phase it expects and a stale caller cannot skip a phase.
#[derive(Debug)]
pub struct LoopGuard {
    phase: AtomicU8,
    /// End of the cooldown window, nanoseconds on the session clock
    cooldown_until: AtomicU64,
}

impl LoopGuard {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(GuardPhase::Idle as u8),
            cooldown_until: AtomicU64::new(0),
        }
    }

    pub fn phase(&self) -> GuardPhase {
        GuardPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Whether a jump is in flight or cooling down
    pub fn is_jumping(&self) -> bool {
        self.phase() != GuardPhase::Idle
    }

    /// Idle → Jumping; false if a jump is already in progress
    pub fn try_begin_jump(&self) -> bool {
        self.transition(GuardPhase::Idle, GuardPhase::Jumping)
    }

    /// Jumping → CoolingDown until `until`
    pub fn seek_completed(&self, until: Duration) -> bool {
        self.cooldown_until.store(duration_nanos(until), Ordering::Release);
        self.transition(GuardPhase::Jumping, GuardPhase::CoolingDown)
    }

    /// CoolingDown → Idle once `now` has reached the cooldown end
    pub fn poll_cooldown(&self, now: Duration) -> bool {
        if self.phase() != GuardPhase::CoolingDown {
            return false;
        }
        if duration_nanos(now) < self.cooldown_until.load(Ordering::Acquire) {
            return false;
        }
        self.transition(GuardPhase::CoolingDown, GuardPhase::Idle)
    }

    /// Force back to Idle (loop cleared or track switched)
    pub fn reset(&self) {
        self.phase.store(GuardPhase::Idle as u8, Ordering::Release);
        self.cooldown_until.store(0, Ordering::Release);
    }

    fn transition(&self, from: GuardPhase, to: GuardPhase) -> bool {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new()
    }
}

fn duration_nanos(d: Duration) -> u64 {
    d.as_nanos().min(u64::MAX as u128) as u64
}

/// Worst-case distance past point B at which a software loop triggers
///
/// A tick can land just before B, so the next tick may be up to one poll
/// interval of media time later: `poll_interval * playback_rate` seconds.
pub fn max_loop_overshoot(poll_interval: Duration, playback_rate: f64) -> f64 {
    poll_interval.as_secs_f64() * playback_rate.max(0.0)
}

/// A-B loop state machine
#[derive(Debug)]
pub struct ABLoopController {
    region: LoopRegion,
    /// User marked B explicitly; disables the duration default
    user_set_b: bool,
    guard: LoopGuard,
    cooldown: Duration,
    auto_set_b: bool,
    mode: LoopMode,
    duration: Option<f64>,
}

impl ABLoopController {
    /// Create a controller
    ///
    /// `auto_set_b` enables the full-track default: the first known duration
    /// becomes point B unless the user already set one.
    pub fn new(cooldown: Duration, auto_set_b: bool) -> Self {
        Self {
            region: LoopRegion::default(),
            user_set_b: false,
            guard: LoopGuard::new(),
            cooldown,
            auto_set_b,
            mode: LoopMode::Software,
            duration: None,
        }
    }

    pub fn region(&self) -> LoopRegion {
        self.region
    }

    pub fn mode(&self) -> LoopMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: LoopMode) {
        self.mode = mode;
    }

    pub fn is_jumping(&self) -> bool {
        self.guard.is_jumping()
    }

    pub fn guard_phase(&self) -> GuardPhase {
        self.guard.phase()
    }

    /// Bounds to hand a native backend, `None` when the loop is off
    pub fn native_bounds(&self) -> Option<(f64, f64)> {
        self.region.bounds()
    }

    /// Mark point A
    pub fn set_point_a(&mut self, t: f64) -> Result<(), LoopError> {
        self.check_point(t)?;
        if let Some(b) = self.region.point_b {
            if t >= b {
                return Err(LoopError::InvalidRange(format!(
                    "point A ({:.2}s) must be before point B ({:.2}s)",
                    t, b
                )));
            }
        }
        self.region.point_a = Some(t);
        self.region.refresh_enabled();
        log::debug!("Loop point A set to {:.3}s", t);
        Ok(())
    }

    /// Mark point B
    pub fn set_point_b(&mut self, t: f64) -> Result<(), LoopError> {
        self.check_point(t)?;
        if let Some(a) = self.region.point_a {
            if t <= a {
                return Err(LoopError::InvalidRange(format!(
                    "point B ({:.2}s) must be after point A ({:.2}s)",
                    t, a
                )));
            }
        }
        self.region.point_b = Some(t);
        self.user_set_b = true;
        self.region.refresh_enabled();
        log::debug!("Loop point B set to {:.3}s", t);
        Ok(())
    }

    /// Replace both points at once (restoring a saved section)
    pub fn set_region(&mut self, a: f64, b: f64) -> Result<(), LoopError> {
        self.check_point(a)?;
        self.check_point(b)?;
        if a >= b {
            return Err(LoopError::InvalidRange(format!(
                "point A ({:.2}s) must be before point B ({:.2}s)",
                a, b
            )));
        }
        self.region.point_a = Some(a);
        self.region.point_b = Some(b);
        self.user_set_b = true;
        self.region.refresh_enabled();
        Ok(())
    }

    /// Reset the region and guard; the track duration is kept
    pub fn clear_loop(&mut self) {
        self.region = LoopRegion::default();
        self.user_set_b = false;
        self.guard.reset();
    }

    /// Clear the loop and forget the duration before a new track loads
    pub fn reset_track(&mut self) {
        self.clear_loop();
        self.duration = None;
    }

    /// Record the track duration without applying the full-track default
    pub fn set_duration(&mut self, duration: f64) {
        if duration.is_finite() && duration > 0.0 {
            self.duration = Some(duration);
        }
    }

    /// Record the track duration; applies the full-track default once
    ///
    /// Returns true if point B was filled in.
    pub fn on_duration_known(&mut self, duration: f64) -> bool {
        if !(duration.is_finite() && duration > 0.0) {
            return false;
        }
        self.duration = Some(duration);

        if !self.auto_set_b
            || self.user_set_b
            || self.region.has_auto_set_b
            || self.region.point_b.is_some()
        {
            return false;
        }
        if matches!(self.region.point_a, Some(a) if a >= duration) {
            return false;
        }

        self.region.point_b = Some(duration);
        self.region.has_auto_set_b = true;
        self.region.refresh_enabled();
        log::debug!("Loop point B defaulted to track end ({:.3}s)", duration);
        true
    }

    /// Consume a position tick
    ///
    /// Returns a seek request when software looping is active, playback is
    /// running, no jump is in flight and `position` lies in `[B, duration)`.
    pub fn tick(
        &mut self,
        now: Duration,
        position: f64,
        duration: f64,
        is_playing: bool,
    ) -> Option<LoopAction> {
        self.guard.poll_cooldown(now);

        if self.mode == LoopMode::Native || !is_playing {
            return None;
        }
        let (a, b) = self.region.bounds()?;
        if !(position >= b && position < duration) {
            return None;
        }
        if !self.guard.try_begin_jump() {
            return None;
        }

        log::debug!(
            "Loop wrap at {:.3}s (B={:.3}s, overshoot {:.0}ms) -> {:.3}s",
            position,
            b,
            (position - b) * 1000.0,
            a
        );
        Some(LoopAction::SeekTo(a))
    }

    /// Report that the seek issued by [`tick`](Self::tick) has resolved
    pub fn seek_completed(&mut self, now: Duration) {
        if !self.guard.seek_completed(now + self.cooldown) {
            log::warn!("seek_completed called with no jump in flight");
        }
    }

    fn check_point(&self, t: f64) -> Result<(), LoopError> {
        if !t.is_finite() || t < 0.0 {
            return Err(LoopError::InvalidRange(format!("{} is not a valid position", t)));
        }
        if let Some(duration) = self.duration {
            if t > duration {
                return Err(LoopError::InvalidRange(format!(
                    "{:.2}s is past the end of the track ({:.2}s)",
                    t, duration
                )));
            }
        }
        Ok(())
    }
}

impl Default for ABLoopController {
    fn default() -> Self {
        Self::new(DEFAULT_LOOP_COOLDOWN, true)
    }
}
